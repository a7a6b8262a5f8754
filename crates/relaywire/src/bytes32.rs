//! Codec shared by the two 32-byte identifiers on the wire. Pubkeys and
//! event ids both travel as 64-char hex and both have a bech32 display
//! form; the decode/encode lives here once instead of per type.

use crate::Error;

pub(crate) fn from_hex(s: &str) -> Result<[u8; 32], Error> {
    if s.len() != 64 {
        return Err(Error::InvalidByteSize);
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(s, &mut out).map_err(|_| Error::HexDecodeFailed)?;
    Ok(out)
}

pub(crate) fn from_bech32(s: &str, expected_hrp: bech32::Hrp) -> Result<[u8; 32], Error> {
    let (hrp, data) = bech32::decode(s).map_err(|_| Error::InvalidBech32)?;
    if hrp != expected_hrp {
        return Err(Error::InvalidBech32);
    }
    data.try_into().map_err(|_| Error::InvalidByteSize)
}

pub(crate) fn to_bech32(hrp: bech32::Hrp, bytes: &[u8; 32]) -> Option<String> {
    bech32::encode::<bech32::Bech32>(hrp, bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    static HRP_TEST: bech32::Hrp = bech32::Hrp::parse_unchecked("tst");

    #[test]
    fn hex_requires_exactly_64_chars() {
        assert!(from_hex(&"ab".repeat(32)).is_ok());
        assert!(matches!(
            from_hex(&"ab".repeat(31)),
            Err(Error::InvalidByteSize)
        ));
        assert!(matches!(
            from_hex(&"zz".repeat(32)),
            Err(Error::HexDecodeFailed)
        ));
    }

    #[test]
    fn bech32_round_trips_and_checks_hrp() {
        let bytes = [7u8; 32];
        let encoded = to_bech32(HRP_TEST, &bytes).unwrap();
        assert_eq!(from_bech32(&encoded, HRP_TEST).unwrap(), bytes);

        let other = bech32::Hrp::parse_unchecked("oth");
        assert!(matches!(
            from_bech32(&encoded, other),
            Err(Error::InvalidBech32)
        ));
    }
}
