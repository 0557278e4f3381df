//! Simulated cards and reader
//!
//! Used by the test suites and by `--simulate` in the binary.

mod card;
mod reader;

pub use card::{SimulatedCard, ADM1_MAX_RETRIES};
pub use reader::{SimulatedReader, Tray};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::{Class, SW};
    use crate::card::files;
    use crate::card::CardTypeVariant;
    use crate::transport::{CardChannel, CardIoError, Transport, TransportError, VerifyStatus};
    use std::time::Duration;

    const ADM1: &str = "12345678";

    fn reader(variant: CardTypeVariant) -> SimulatedReader {
        SimulatedReader::with_cards([SimulatedCard::new(variant, "8988211000000000001", ADM1)])
    }

    #[test]
    fn test_counter_and_verify() {
        let mut r = reader(CardTypeVariant::Sja2);
        r.connect(Duration::from_secs(1)).unwrap();
        let mut ch = CardChannel::new(&mut r, Class::Uicc);
        assert_eq!(ch.adm1_retries().unwrap(), 3);
        assert_eq!(ch.verify_adm1(b"00000000").unwrap(), VerifyStatus::Rejected(Some(2)));
        assert_eq!(ch.verify_adm1(ADM1.as_bytes()).unwrap(), VerifyStatus::Accepted);
        assert_eq!(ch.adm1_retries().unwrap(), 3);
    }

    #[test]
    fn test_counter_reaches_zero() {
        let mut r = reader(CardTypeVariant::Sjs1);
        r.connect(Duration::from_secs(1)).unwrap();
        let mut ch = CardChannel::new(&mut r, Class::Gsm);
        assert_eq!(ch.verify_adm1(b"00000000").unwrap(), VerifyStatus::Rejected(Some(2)));
        assert_eq!(ch.verify_adm1(b"00000000").unwrap(), VerifyStatus::Rejected(Some(1)));
        assert_eq!(ch.verify_adm1(b"00000000").unwrap(), VerifyStatus::Blocked);
        assert_eq!(ch.verify_adm1(ADM1.as_bytes()).unwrap(), VerifyStatus::Blocked);
        assert_eq!(ch.adm1_retries().unwrap(), 0);
    }

    #[test]
    fn test_secret_files_are_write_only() {
        let mut r = reader(CardTypeVariant::Sja5);
        r.connect(Duration::from_secs(1)).unwrap();
        let mut ch = CardChannel::new(&mut r, Class::Uicc);
        ch.verify_adm1(ADM1.as_bytes()).unwrap();
        ch.select_path(&files::EF_SJA_AUTH_USIM).unwrap();
        ch.update_binary(1, &[0x11; 16]).unwrap();
        let err = ch.read_binary(0, 17).unwrap_err();
        assert_eq!(err.sw(), Some(SW::SECURITY_STATUS_NOT_SATISFIED));
        let auth = r.inserted().unwrap().file(&files::EF_SJA_AUTH_USIM).unwrap();
        assert_eq!(&auth[1..17], &[0x11; 16]);
    }

    #[test]
    fn test_update_needs_adm1() {
        let mut r = reader(CardTypeVariant::Sja2);
        r.connect(Duration::from_secs(1)).unwrap();
        let mut ch = CardChannel::new(&mut r, Class::Uicc);
        ch.select_path(&files::EF_GSM_IMSI).unwrap();
        let err = ch.update_binary(0, &[0x08]).unwrap_err();
        assert!(matches!(err, CardIoError::Status { sw: SW::SECURITY_STATUS_NOT_SATISFIED, .. }));
    }

    #[test]
    fn test_wrong_class_is_refused() {
        let mut r = reader(CardTypeVariant::Sjs1);
        r.connect(Duration::from_secs(1)).unwrap();
        let err = CardChannel::new(&mut r, Class::Uicc)
            .select_path(&files::EF_ICCID)
            .unwrap_err();
        assert_eq!(err.sw(), Some(SW::CLA_NOT_SUPPORTED));
    }

    #[test]
    fn test_reader_swaps_cards() {
        let mut r = SimulatedReader::new();
        r.push(SimulatedCard::new(CardTypeVariant::Sja2, "8988211000000000001", ADM1));
        r.push_gap();
        r.push(SimulatedCard::new(CardTypeVariant::Sja5, "8988211000000000002", ADM1));
        let tray = r.tray();

        assert!(r.connect(Duration::from_secs(1)).is_ok());
        r.disconnect();
        assert_eq!(r.connect(Duration::from_secs(1)), Err(TransportError::CardNotPresent));
        assert_eq!(r.transmit(&[0x00, 0xA4, 0x00, 0x04]), Err(TransportError::CardRemoved));
        assert!(r.connect(Duration::from_secs(1)).is_ok());
        assert_eq!(r.inserted().unwrap().variant(), CardTypeVariant::Sja5);
        r.disconnect();
        assert_eq!(tray.lock().len(), 2);
    }
}
