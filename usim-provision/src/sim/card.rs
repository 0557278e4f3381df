//! In-memory sysmocom card
//!
//! Answers the handful of commands the programmer uses over a flat file
//! table. ADM1 is stored hashed and has the real cards' three attempts.

use std::collections::{BTreeMap, HashSet};

use log::{debug, error};
use sha2::{Digest, Sha256};

use crate::apdu::{ins, key_ref, parse_apdu, Response, APDU, SW};
use crate::card::files::{self, FilePath};
use crate::card::{CardDetector, CardTypeVariant};
use crate::codec::bcd;

pub const ADM1_MAX_RETRIES: u8 = 3;

/// A simulated card of one variant
#[derive(Debug, Clone)]
pub struct SimulatedCard {
    variant: CardTypeVariant,
    atr: Vec<u8>,
    files: BTreeMap<Vec<u16>, Vec<u8>>,
    dirs: HashSet<Vec<u16>>,
    current: Vec<u16>,
    adm1_hash: Vec<u8>,
    adm1_retries: u8,
    adm1_verified: bool,
    /// Paths whose updates are acknowledged but dropped
    frozen: HashSet<Vec<u16>>,
    /// Paths whose updates fail with the given status word
    failing: BTreeMap<Vec<u16>, u16>,
    commands: usize,
}

impl SimulatedCard {
    /// A factory-fresh card with the given ICCID and ADM1 key
    pub fn new(variant: CardTypeVariant, iccid: &str, adm1: &str) -> Self {
        let mut card = Self {
            variant,
            atr: CardDetector::reference_atr(variant),
            files: BTreeMap::new(),
            dirs: HashSet::new(),
            current: vec![files::MF],
            adm1_hash: Self::hash_key(adm1.as_bytes()),
            adm1_retries: ADM1_MAX_RETRIES,
            adm1_verified: false,
            frozen: HashSet::new(),
            failing: BTreeMap::new(),
            commands: 0,
        };
        card.create_file_system();
        if let Some(encoded) = bcd::encode_iccid(iccid) {
            card.put(files::EF_ICCID, encoded);
        }
        card
    }

    pub fn hash_key(key: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.finalize().to_vec()
    }

    fn create_file_system(&mut self) {
        let mut layout: Vec<(FilePath, usize)> = vec![
            (files::EF_ICCID, 10),
            (files::EF_GSM_IMSI, 9),
            (files::EF_GSM_AD, 4),
            (files::EF_PLMNSEL, 24),
            (files::EF_HPLMNWACT, 5),
            (files::EF_OPLMNWACT, 200),
        ];
        match self.variant {
            CardTypeVariant::Sjs1 => layout.extend([
                (files::EF_SJS1_AUTH, 2),
                (files::EF_SJS1_KI, 16),
                (files::EF_SJS1_OPC, 17),
                (files::EF_SJS1_MILENAGE_CFG, 85),
                (files::EF_SJS1_SQN, 2),
            ]),
            CardTypeVariant::Sja2 | CardTypeVariant::Sja5 => {
                layout.extend([
                    (files::EF_USIM_IMSI, 9),
                    (files::EF_USIM_AD, 4),
                    (files::EF_UST, 17),
                    (files::EF_SJA_AUTH_2G, 65),
                    (files::EF_SJA_AUTH_USIM, 65),
                    (files::EF_SJA_AUTH_ISIM, 65),
                    (files::EF_SJA_MILENAGE_CFG, 85),
                    (files::EF_SJA_SQN, 2),
                ]);
                if self.variant == CardTypeVariant::Sja5 {
                    layout.extend([
                        (files::EF_SJA5_TUAK_CFG, 2),
                        (files::EF_SUCI_CALC_INFO, 64),
                        (files::EF_ROUTING_INDICATOR, 4),
                    ]);
                }
            }
        }
        for (path, len) in layout {
            self.put(path, vec![0xFF; len]);
        }
        // Factory EF.AD: normal operation, 2 digit MNC
        self.put(files::EF_GSM_AD, vec![0x00, 0x00, 0x00, 0x02]);
        if self.variant != CardTypeVariant::Sjs1 {
            self.put(files::EF_USIM_AD, vec![0x00, 0x00, 0x00, 0x02]);
            self.put(files::EF_UST, vec![0x00; 17]);
        }
    }

    fn put(&mut self, path: FilePath, data: Vec<u8>) {
        let ids = path.ids();
        for depth in 1..ids.len() {
            self.dirs.insert(ids[..depth].to_vec());
        }
        self.files.insert(ids.to_vec(), data);
    }

    pub fn variant(&self) -> CardTypeVariant {
        self.variant
    }

    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    pub fn set_atr(&mut self, atr: Vec<u8>) {
        self.atr = atr;
    }

    /// Contents of a file, including write-only ones
    pub fn file(&self, path: &FilePath) -> Option<&[u8]> {
        self.files.get(path.ids()).map(Vec::as_slice)
    }

    pub fn adm1_retries(&self) -> u8 {
        self.adm1_retries
    }

    pub fn set_adm1_retries(&mut self, retries: u8) {
        self.adm1_retries = retries.min(ADM1_MAX_RETRIES);
    }

    pub fn is_adm1_verified(&self) -> bool {
        self.adm1_verified
    }

    /// Acknowledge updates of `path` without storing them
    pub fn freeze(&mut self, path: FilePath) {
        self.frozen.insert(path.ids().to_vec());
    }

    /// Fail updates of `path` with `sw`
    pub fn fail_updates(&mut self, path: FilePath, sw: u16) {
        self.failing.insert(path.ids().to_vec(), sw);
    }

    /// Number of APDUs processed since manufacture
    pub fn command_count(&self) -> usize {
        self.commands
    }

    /// Power-on reset: selection and security state are cleared
    pub fn reset(&mut self) -> Vec<u8> {
        self.current = vec![files::MF];
        self.adm1_verified = false;
        self.atr.clone()
    }

    fn class_byte(&self) -> u8 {
        match self.variant {
            CardTypeVariant::Sjs1 => 0xA0,
            CardTypeVariant::Sja2 | CardTypeVariant::Sja5 => 0x00,
        }
    }

    fn security_sw(&self) -> u16 {
        match self.variant {
            CardTypeVariant::Sjs1 => SW::GSM_ACCESS_CONDITION_NOT_FULFILLED,
            _ => SW::SECURITY_STATUS_NOT_SATISFIED,
        }
    }

    fn blocked_sw(&self) -> u16 {
        match self.variant {
            CardTypeVariant::Sjs1 => SW::GSM_CHV_BLOCKED,
            _ => SW::AUTH_METHOD_BLOCKED,
        }
    }

    /// Process an APDU command
    pub fn process_apdu(&mut self, apdu_bytes: &[u8]) -> Vec<u8> {
        self.commands += 1;
        let cmd = match parse_apdu(apdu_bytes) {
            Ok(apdu) => apdu,
            Err(e) => {
                error!("Failed to parse APDU: {:?}", e);
                return Response::error(SW::WRONG_LENGTH).to_bytes();
            }
        };
        debug!(
            "Simulated {} APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X}",
            self.variant, cmd.cla, cmd.ins, cmd.p1, cmd.p2
        );

        if cmd.cla != self.class_byte() {
            return Response::error(SW::CLA_NOT_SUPPORTED).to_bytes();
        }
        let response = match cmd.ins {
            ins::SELECT => self.handle_select(&cmd),
            ins::READ_BINARY => self.handle_read_binary(&cmd),
            ins::UPDATE_BINARY => self.handle_update_binary(&cmd),
            ins::VERIFY => self.handle_verify(&cmd),
            _ => Response::error(SW::INS_NOT_SUPPORTED),
        };
        response.to_bytes()
    }

    fn handle_select(&mut self, cmd: &APDU) -> Response {
        let [hi, lo] = match cmd.data.as_slice() {
            [hi, lo] => [*hi, *lo],
            _ => return Response::error(SW::WRONG_LENGTH),
        };
        let fid = u16::from_be_bytes([hi, lo]);
        if fid == files::MF {
            self.current = vec![files::MF];
            return Response::ok();
        }
        let mut parent = self.current.clone();
        if self.files.contains_key(&parent) {
            parent.pop();
        }
        parent.push(fid);
        if self.files.contains_key(&parent) || self.dirs.contains(&parent) {
            self.current = parent;
            Response::ok()
        } else {
            Response::error(SW::FILE_NOT_FOUND)
        }
    }

    fn selected_ef(&self) -> Result<&Vec<u8>, Response> {
        self.files
            .get(&self.current)
            .ok_or_else(|| Response::error(SW::COMMAND_NOT_ALLOWED_NO_EF))
    }

    fn handle_read_binary(&self, cmd: &APDU) -> Response {
        let data = match self.selected_ef() {
            Ok(data) => data,
            Err(resp) => return resp,
        };
        if files::is_secret_ids(&self.current) {
            return Response::error(self.security_sw());
        }
        let offset = cmd.p1p2() as usize;
        let len = cmd.le.unwrap_or(256) as usize;
        if offset > data.len() {
            return Response::error(SW::WRONG_P1_P2);
        }
        match data.get(offset..offset + len) {
            Some(slice) => Response::success(slice.to_vec()),
            None => Response::error(SW::WRONG_LENGTH),
        }
    }

    fn handle_update_binary(&mut self, cmd: &APDU) -> Response {
        let len = match self.selected_ef() {
            Ok(data) => data.len(),
            Err(resp) => return resp,
        };
        if !self.adm1_verified {
            return Response::error(self.security_sw());
        }
        if let Some(sw) = self.failing.get(&self.current) {
            return Response::error(*sw);
        }
        let offset = cmd.p1p2() as usize;
        if offset + cmd.data.len() > len {
            return Response::error(SW::WRONG_LENGTH);
        }
        if self.frozen.contains(&self.current) {
            return Response::ok();
        }
        if let Some(file) = self.files.get_mut(&self.current) {
            file[offset..offset + cmd.data.len()].copy_from_slice(&cmd.data);
        }
        Response::ok()
    }

    fn handle_verify(&mut self, cmd: &APDU) -> Response {
        if cmd.p2 != key_ref::ADM1 {
            return Response::error(SW::WRONG_P1_P2);
        }
        if self.adm1_retries == 0 {
            return Response::error(self.blocked_sw());
        }
        // Empty body: report the counter
        if cmd.data.is_empty() {
            return Response::counter_warning(self.adm1_retries);
        }
        if Self::hash_key(&cmd.data) == self.adm1_hash {
            self.adm1_retries = ADM1_MAX_RETRIES;
            self.adm1_verified = true;
            return Response::ok();
        }
        self.adm1_retries -= 1;
        self.adm1_verified = false;
        if self.adm1_retries == 0 {
            Response::error(self.blocked_sw())
        } else {
            Response::counter_warning(self.adm1_retries)
        }
    }
}
