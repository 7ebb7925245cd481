//! Content and style losses over parallel feature sets.

use candle_core::Tensor;

use crate::error::{Error, Result};
use crate::model::FeatureSet;

/// Relative weights of the two loss terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossWeights {
    /// Content loss weight.
    pub alpha: f64,
    /// Style loss weight.
    pub beta: f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.01,
        }
    }
}

/// Scalar loss tensors for one step. `total` is the one to differentiate.
#[derive(Debug, Clone)]
pub struct Losses {
    /// Unweighted content loss.
    pub content: Tensor,
    /// Unweighted style loss.
    pub style: Tensor,
    /// `alpha * content + beta * style`.
    pub total: Tensor,
}

impl Losses {
    /// Read the three scalars back as `(content, style, total)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the values cannot be copied off the device.
    pub fn values(&self) -> Result<(f32, f32, f32)> {
        Ok((
            self.content.to_scalar::<f32>()?,
            self.style.to_scalar::<f32>()?,
            self.total.to_scalar::<f32>()?,
        ))
    }
}

/// Gram matrix `F * F^T` of a (1, C, H, W) or (C, H, W) feature map.
///
/// # Errors
///
/// Returns an error for any other rank or if the product fails.
pub fn gram_matrix(feature: &Tensor) -> Result<Tensor> {
    let (channels, height, width) = match *feature.dims() {
        [1, c, h, w] | [c, h, w] => (c, h, w),
        _ => {
            return Err(Error::ShapeMismatch {
                expected: "(1, C, H, W) or (C, H, W)".to_string(),
                actual: format!("{:?}", feature.dims()),
            })
        }
    };

    let flat = feature.reshape((channels, height * width))?;
    Ok(flat.matmul(&flat.t()?)?)
}

fn mean_squared_error(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    Ok((a - b)?.sqr()?.mean_all()?)
}

fn sum_scalars(terms: &[Tensor]) -> Result<Tensor> {
    match terms {
        [] => Err(Error::ShapeMismatch {
            expected: "at least one feature layer".to_string(),
            actual: "0 layers".to_string(),
        }),
        terms => Ok(Tensor::stack(terms, 0)?.sum_all()?),
    }
}

fn check_layer_count(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            expected: format!("{expected} feature layers"),
            actual: format!("{actual} feature layers"),
        })
    }
}

/// Sum over layers of the mean squared feature difference.
///
/// # Errors
///
/// Returns an error if the layer counts or shapes differ.
pub fn content_loss(generated: &[Tensor], content: &[Tensor]) -> Result<Tensor> {
    check_layer_count(content.len(), generated.len())?;

    let terms = generated
        .iter()
        .zip(content)
        .map(|(g, c)| mean_squared_error(g, c))
        .collect::<Result<Vec<_>>>()?;
    sum_scalars(&terms)
}

/// Sum over layers of the mean squared difference between the generated
/// Gram matrices and precomputed style Gram matrices.
///
/// # Errors
///
/// Returns an error if the layer counts or channel counts differ.
pub fn style_loss(generated: &[Tensor], style_grams: &[Tensor]) -> Result<Tensor> {
    check_layer_count(style_grams.len(), generated.len())?;

    let terms = generated
        .iter()
        .zip(style_grams)
        .map(|(g, target)| mean_squared_error(&gram_matrix(g)?, target))
        .collect::<Result<Vec<_>>>()?;
    sum_scalars(&terms)
}

/// The fixed side of the loss: content features and style Gram matrices.
///
/// Both references are immutable for a job, so they are computed once and
/// detached from any graph.
#[derive(Debug, Clone)]
pub struct Targets {
    content: FeatureSet,
    style_grams: Vec<Tensor>,
}

impl Targets {
    /// Precompute targets from the content and style feature sets.
    ///
    /// # Errors
    ///
    /// Returns an error if the sets differ in layer count or a Gram matrix
    /// cannot be computed.
    pub fn new(content: &[Tensor], style: &[Tensor]) -> Result<Self> {
        check_layer_count(content.len(), style.len())?;

        let style_grams = style
            .iter()
            .map(|f| gram_matrix(&f.detach()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            content: content.iter().map(Tensor::detach).collect(),
            style_grams,
        })
    }

    /// Weighted loss of `generated` against these targets.
    ///
    /// # Errors
    ///
    /// Returns an error if the feature sets are incompatible.
    pub fn loss(&self, generated: &[Tensor], weights: LossWeights) -> Result<Losses> {
        let content = content_loss(generated, &self.content)?;
        let style = style_loss(generated, &self.style_grams)?;
        let total = (content.affine(weights.alpha, 0.0)? + style.affine(weights.beta, 0.0)?)?;

        Ok(Losses {
            content,
            style,
            total,
        })
    }
}

/// Combined loss of three parallel feature sets.
///
/// # Errors
///
/// Returns an error if the feature sets are incompatible.
pub fn compute_loss(
    generated: &[Tensor],
    content: &[Tensor],
    style: &[Tensor],
    weights: LossWeights,
) -> Result<Losses> {
    check_layer_count(content.len(), generated.len())?;
    Targets::new(content, style)?.loss(generated, weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn random_set(shapes: &[(usize, usize, usize)]) -> Vec<Tensor> {
        shapes
            .iter()
            .map(|&(c, h, w)| Tensor::randn(0f32, 1f32, (1, c, h, w), &Device::Cpu).unwrap())
            .collect()
    }

    fn scalar(t: &Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn test_gram_known_values() {
        let feature = Tensor::new(&[[[1f32, 2.0]], [[3.0, 4.0]]], &Device::Cpu).unwrap();
        let gram = gram_matrix(&feature).unwrap();

        assert_eq!(
            gram.to_vec2::<f32>().unwrap(),
            vec![vec![5.0, 11.0], vec![11.0, 25.0]]
        );
    }

    #[test]
    fn test_gram_is_symmetric() {
        let feature = Tensor::randn(0f32, 1f32, (1, 6, 5, 7), &Device::Cpu).unwrap();
        let gram = gram_matrix(&feature).unwrap();
        let values = gram.to_vec2::<f32>().unwrap();

        assert_eq!(gram.dims2().unwrap(), (6, 6));
        for i in 0..6 {
            for j in 0..6 {
                assert!((values[i][j] - values[j][i]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_gram_rejects_batches() {
        let feature = Tensor::zeros((2, 3, 4, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(gram_matrix(&feature).is_err());
    }

    #[test]
    fn test_content_loss_zero_for_identical_features() {
        let features = random_set(&[(4, 8, 8), (8, 4, 4)]);
        let loss = content_loss(&features, &features).unwrap();

        assert_eq!(scalar(&loss), 0.0);
    }

    #[test]
    fn test_content_loss_sums_layer_means() {
        let ones = vec![
            Tensor::ones((1, 2, 3, 3), DType::F32, &Device::Cpu).unwrap(),
            Tensor::ones((1, 4, 2, 2), DType::F32, &Device::Cpu).unwrap(),
        ];
        let zeros: Vec<_> = ones.iter().map(|t| t.zeros_like().unwrap()).collect();

        let loss = content_loss(&ones, &zeros).unwrap();
        assert!((scalar(&loss) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_weights_isolate_terms() {
        let shapes = [(4, 8, 8), (8, 4, 4)];
        let generated = random_set(&shapes);
        let content = random_set(&shapes);
        let style = random_set(&shapes);

        let style_only = compute_loss(
            &generated,
            &content,
            &style,
            LossWeights {
                alpha: 0.0,
                beta: 1.0,
            },
        )
        .unwrap();
        let (_, s, total) = style_only.values().unwrap();
        assert!((total - s).abs() <= s.abs() * 1e-6);

        let content_only = compute_loss(
            &generated,
            &content,
            &style,
            LossWeights {
                alpha: 1.0,
                beta: 0.0,
            },
        )
        .unwrap();
        let (c, _, total) = content_only.values().unwrap();
        assert!((total - c).abs() <= c.abs() * 1e-6);
    }

    #[test]
    fn test_losses_are_non_negative() {
        let shapes = [(3, 6, 6)];
        let losses = compute_loss(
            &random_set(&shapes),
            &random_set(&shapes),
            &random_set(&shapes),
            LossWeights::default(),
        )
        .unwrap();
        let (c, s, total) = losses.values().unwrap();

        assert!(c >= 0.0);
        assert!(s >= 0.0);
        assert!(total >= 0.0);
    }

    #[test]
    fn test_style_tolerates_different_spatial_size() {
        let generated = random_set(&[(4, 8, 8)]);
        let content = random_set(&[(4, 8, 8)]);
        let style = random_set(&[(4, 5, 3)]);

        assert!(compute_loss(&generated, &content, &style, LossWeights::default()).is_ok());
    }

    #[test]
    fn test_layer_count_mismatch() {
        let two = random_set(&[(4, 4, 4), (4, 2, 2)]);
        let one = random_set(&[(4, 4, 4)]);

        let err = compute_loss(&two, &one, &two, LossWeights::default()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
