//! The FRU two's-complement zero-sum checksum used by every area header and
//! every multirecord header/body.

/// Computes the checksum byte that, appended to `bytes`, makes the region
/// sum to zero modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum: u8 = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum.wrapping_neg()
}

/// Verifies that `bytes` (which already includes its own trailing checksum
/// byte) sums to zero modulo 256.
pub fn verify(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_empty_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn checksum_round_trips() {
        let data = [0x01, 0x02, 0x03, 0xAB, 0xCD];
        let cksum = checksum(&data);
        let mut with_cksum = data.to_vec();
        with_cksum.push(cksum);
        assert!(verify(&with_cksum));
    }

    #[test]
    fn corrupted_checksum_fails_verify() {
        let data = [0x01, 0x02, 0x03];
        let mut with_cksum = data.to_vec();
        with_cksum.push(checksum(&data) ^ 0x01);
        assert!(!verify(&with_cksum));
    }
}
