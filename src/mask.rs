/// XOR `data` with `mask`, cycling the key by `index % 4`.
///
/// Masking is its own inverse: applying the same key twice restores the input.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// Fresh masking key for one outgoing frame.
#[inline]
pub(crate) fn random_key() -> [u8; 4] {
    rand::random()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_hello() {
        let mut data = *b"Hello";
        apply_mask(&mut data, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn mask_is_self_inverse() {
        let original: Vec<u8> = (0..=255).collect();
        for _ in 0..8 {
            let key = random_key();
            let mut data = original.clone();
            apply_mask(&mut data, key);
            apply_mask(&mut data, key);
            assert_eq!(data, original);
        }
    }
}
