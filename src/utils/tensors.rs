use burn::tensor::{backend::Backend, Bool, Data, ElementConversion, Int, Shape, Tensor};

/// Pad a batch of id sequences to a specific length, typically the maximum number of positions
pub fn pad_to<B: Backend>(
    pad_token: usize,
    tokens_list: Vec<Vec<usize>>,
    seq_length: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let batch_size = tokens_list.len();

    let mut tensor = Tensor::zeros([batch_size, seq_length], device);
    tensor = tensor.add_scalar(pad_token as i64);

    for (index, tokens) in tokens_list.into_iter().enumerate() {
        let length = tokens.len().min(seq_length);
        if length == 0 {
            continue;
        }

        tensor = tensor.slice_assign(
            [index..index + 1, 0..length],
            ids_to_batch(&tokens[..length], device),
        );
    }

    tensor
}

/// A single sequence of ids as a `[1, seq_length]` batch
pub fn ids_to_batch<B: Backend>(ids: &[usize], device: &B::Device) -> Tensor<B, 2, Int> {
    Tensor::from_data(
        Data::new(
            ids.iter().map(|&e| (e as i64).elem()).collect(),
            Shape::new([1, ids.len()]),
        ),
        device,
    )
}

/// A flat list of ids, e.g. for `select`
pub fn ids_to_tensor<B: Backend>(ids: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    Tensor::from_data(
        Data::new(
            ids.iter().map(|&e| (e as i64).elem()).collect(),
            Shape::new([ids.len()]),
        ),
        device,
    )
}

/// Flat positions (row-major) where the mask is set
pub fn mask_positions<B: Backend, const D: usize>(mask: Tensor<B, D, Bool>) -> Vec<usize> {
    mask.into_data()
        .value
        .into_iter()
        .enumerate()
        .filter_map(|(index, set)| set.then_some(index))
        .collect()
}

/// Convert an argmax result into plain class indices
pub fn to_indices<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Vec<usize> {
    tensor
        .into_data()
        .convert::<i64>()
        .value
        .into_iter()
        .map(|index| index.max(0) as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn pads_every_row_to_the_requested_length() {
        let device = Default::default();

        let batch = pad_to::<TestBackend>(1, vec![vec![0, 7, 2], vec![0, 2]], 5, &device);

        assert_eq!(batch.dims(), [2, 5]);
        assert_eq!(to_indices(batch), vec![0, 7, 2, 1, 1, 0, 2, 1, 1, 1]);
    }

    #[test]
    fn finds_masked_positions() {
        let device = Default::default();
        let ids = ids_to_batch::<TestBackend>(&[0, 1, 5, 1], &device);

        assert_eq!(mask_positions(ids.equal_elem(1)), vec![1, 3]);
    }
}
