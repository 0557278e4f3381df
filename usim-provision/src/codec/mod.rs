//! Parameter encoding
//!
//! [`ParameterCodec::plan`] turns a [`ConfigurationRecord`] into the ordered
//! list of file writes for one card variant. Anything the variant can't
//! hold is refused before a single byte is planned.

pub mod auth;
pub mod bcd;
mod identity;
pub mod network;
pub mod suci;

pub use identity::IdentityField;

use std::fmt;

use thiserror::Error;

use crate::apdu::Class;
use crate::card::files::{self, FilePath};
use crate::card::{CardTypeVariant, Generation};
use crate::config::{ConfigurationRecord, Field, MilenageParams, SqnPolicy, TuakParams};

/// How a write changes its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// UPDATE BINARY at `offset`
    Replace { offset: u16, data: Vec<u8> },
    /// Read-modify-write of one byte
    SetBits { offset: u16, set: u8, clear: u8 },
}

impl WriteOp {
    /// New value of a byte touched by `SetBits`
    pub fn merge(set: u8, clear: u8, old: u8) -> u8 {
        (old & !clear) | set
    }
}

/// A single planned write
#[derive(Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub field: Field,
    pub path: FilePath,
    pub op: WriteOp,
}

impl FileWrite {
    pub fn is_secret(&self) -> bool {
        self.field.is_secret() || files::is_secret(&self.path)
    }
}

impl fmt::Debug for FileWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("FileWrite");
        s.field("field", &self.field).field("path", &self.path.to_string());
        match &self.op {
            WriteOp::Replace { offset, data } if self.is_secret() => s
                .field("offset", offset)
                .field("data", &format_args!("<{} bytes redacted>", data.len())),
            WriteOp::Replace { offset, data } => s
                .field("offset", offset)
                .field("data", &hex::encode_upper(data)),
            WriteOp::SetBits { offset, set, clear } => s
                .field("offset", offset)
                .field("set", set)
                .field("clear", clear),
        };
        s.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{field} is not supported by {variant}")]
    UnsupportedField { field: Field, variant: CardTypeVariant },
    #[error("{field} cannot be encoded")]
    Unencodable { field: Field },
}

pub const MILENAGE_CFG_LEN: usize = 85;

/// Stateless encoder between configuration records and card files
pub struct ParameterCodec;

impl ParameterCodec {
    /// Instruction class the variant is programmed with
    pub fn class(variant: CardTypeVariant) -> Class {
        match variant {
            CardTypeVariant::Sjs1 => Class::Gsm,
            CardTypeVariant::Sja2 | CardTypeVariant::Sja5 => Class::Uicc,
        }
    }

    /// Ordered writes: identity, secrets, algorithm selection, advanced
    pub fn plan(
        variant: CardTypeVariant,
        record: &ConfigurationRecord,
    ) -> Result<Vec<FileWrite>, CodecError> {
        check_capabilities(variant, record)?;

        let mut plan = Plan::default();
        plan_identity(&mut plan, variant, record)?;
        plan_secrets(&mut plan, variant, record)?;
        plan_algorithms(&mut plan, variant, record)?;
        plan_advanced(&mut plan, variant, record)?;
        Ok(plan.writes)
    }
}

#[derive(Default)]
struct Plan {
    writes: Vec<FileWrite>,
}

impl Plan {
    fn replace(&mut self, field: Field, path: FilePath, offset: u16, data: Vec<u8>) {
        self.writes.push(FileWrite {
            field,
            path,
            op: WriteOp::Replace { offset, data },
        });
    }

    fn set_bits(&mut self, field: Field, path: FilePath, offset: u16, set: u8, clear: u8) {
        self.writes.push(FileWrite {
            field,
            path,
            op: WriteOp::SetBits { offset, set, clear },
        });
    }
}

fn unsupported(field: Field, variant: CardTypeVariant) -> CodecError {
    CodecError::UnsupportedField { field, variant }
}

fn unencodable(field: Field) -> impl FnOnce() -> CodecError {
    move || CodecError::Unencodable { field }
}

fn check_capabilities(
    variant: CardTypeVariant,
    record: &ConfigurationRecord,
) -> Result<(), CodecError> {
    let caps = variant.capabilities();
    for generation in Generation::ALL {
        if !caps.supports(record.algorithm(generation), generation) {
            return Err(unsupported(Field::Algorithm(generation), variant));
        }
    }
    if !caps.separate_4g5g_slot && record.algo_4g5g != record.algo_3g {
        return Err(unsupported(Field::Algorithm(Generation::FourFiveG), variant));
    }
    if record.ki.len() == 32 && !caps.long_keys {
        return Err(unsupported(Field::Ki, variant));
    }
    if record.opc.as_ref().is_some_and(|o| o.len() == 32) && !caps.long_keys {
        return Err(unsupported(Field::Opc, variant));
    }
    if record.tuak.is_some() && !caps.tuak {
        return Err(unsupported(Field::TuakConfig, variant));
    }
    if record.concealment.is_some() && !caps.concealment {
        return Err(unsupported(Field::RoutingIndicator, variant));
    }
    Ok(())
}

fn plan_identity(
    plan: &mut Plan,
    variant: CardTypeVariant,
    record: &ConfigurationRecord,
) -> Result<(), CodecError> {
    let iccid = bcd::encode_iccid(&record.iccid).ok_or_else(unencodable(Field::Iccid))?;
    plan.replace(Field::Iccid, files::EF_ICCID, 0, iccid);

    let imsi = bcd::encode_imsi(&record.imsi).ok_or_else(unencodable(Field::Imsi))?;
    // SJS1 is programmed through DF GSM only
    let with_usim = variant != CardTypeVariant::Sjs1;
    plan.replace(Field::Imsi, files::EF_GSM_IMSI, 0, imsi.clone());
    if with_usim {
        plan.replace(Field::Imsi, files::EF_USIM_IMSI, 0, imsi);
    }
    if !(1..=3).contains(&record.mnc_length) {
        return Err(CodecError::Unencodable { field: Field::MncLength });
    }
    plan.set_bits(Field::MncLength, files::EF_GSM_AD, 3, record.mnc_length, 0x0F);
    if with_usim {
        plan.set_bits(Field::MncLength, files::EF_USIM_AD, 3, record.mnc_length, 0x0F);
    }
    Ok(())
}

fn plan_secrets(
    plan: &mut Plan,
    variant: CardTypeVariant,
    record: &ConfigurationRecord,
) -> Result<(), CodecError> {
    let ki = record.ki.expose();
    let opc = record.opc.as_ref().map(|o| o.expose());
    match variant {
        CardTypeVariant::Sjs1 => {
            plan.replace(Field::Ki, files::EF_SJS1_KI, 0, ki.to_vec());
            if let Some(opc) = opc {
                let mut data = vec![u8::from(record.use_opc)];
                data.extend_from_slice(opc);
                plan.replace(Field::Opc, files::EF_SJS1_OPC, 0, data);
            }
        }
        CardTypeVariant::Sja2 | CardTypeVariant::Sja5 => {
            for generation in Generation::ALL {
                let slot = files::auth_slot(variant, generation)
                    .ok_or_else(|| unsupported(Field::Ki, variant))?;
                plan.replace(Field::Ki, slot, auth::SJA_KEY_OFFSET, ki.to_vec());
                if let Some(opc) = opc {
                    let offset = auth::SJA_KEY_OFFSET + ki.len() as u16;
                    plan.replace(Field::Opc, slot, offset, opc.to_vec());
                }
            }
        }
    }
    Ok(())
}

fn plan_algorithms(
    plan: &mut Plan,
    variant: CardTypeVariant,
    record: &ConfigurationRecord,
) -> Result<(), CodecError> {
    match variant {
        CardTypeVariant::Sjs1 => {
            // One file, one byte per slot; 4G/5G shares the 3G byte.
            for (offset, generation) in [(0, Generation::TwoG), (1, Generation::ThreeG)] {
                let code = auth::sjs1_code(record.algorithm(generation), generation)
                    .ok_or_else(|| unsupported(Field::Algorithm(generation), variant))?;
                plan.replace(Field::Algorithm(generation), files::EF_SJS1_AUTH, offset, vec![code]);
            }
        }
        CardTypeVariant::Sja2 | CardTypeVariant::Sja5 => {
            let key_256 = record.ki.len() == 32;
            for generation in Generation::ALL {
                let slot = files::auth_slot(variant, generation)
                    .ok_or_else(|| unsupported(Field::Algorithm(generation), variant))?;
                let header =
                    auth::sja_header(record.algorithm(generation), record.use_opc, key_256);
                plan.replace(Field::Algorithm(generation), slot, 0, vec![header]);
            }
        }
    }
    Ok(())
}

fn plan_advanced(
    plan: &mut Plan,
    variant: CardTypeVariant,
    record: &ConfigurationRecord,
) -> Result<(), CodecError> {
    if let Some(milenage) = &record.milenage {
        plan.replace(
            Field::MilenageConfig,
            files::milenage_cfg(variant),
            0,
            milenage_cfg(milenage),
        );
    }
    if let Some(tuak) = &record.tuak {
        let data = tuak_cfg(tuak).ok_or_else(unencodable(Field::TuakConfig))?;
        plan.replace(Field::TuakConfig, files::EF_SJA5_TUAK_CFG, 0, data);
    }
    if let Some(sqn) = &record.sqn {
        plan.replace(Field::SqnConfig, files::sqn(variant), 0, sqn_cfg(sqn));
    }

    if let Some(net) = &record.network {
        if let Some(hplmn) = &net.hplmn {
            let sel = network::plmnsel(hplmn).ok_or_else(unencodable(Field::Hplmn))?;
            plan.replace(Field::Hplmn, files::EF_PLMNSEL, 0, sel);
            let act = network::access_technology(record);
            let wact = network::hplmnwact(hplmn, act).ok_or_else(unencodable(Field::Hplmn))?;
            plan.replace(Field::Hplmn, files::EF_HPLMNWACT, 0, wact);
        }
        if !net.oplmn.is_empty() {
            let data = network::oplmnwact(&net.oplmn).ok_or_else(unencodable(Field::OplmnAct))?;
            plan.replace(Field::OplmnAct, files::EF_OPLMNWACT, 0, data);
        }
    }

    if let Some(c) = &record.concealment {
        plan.replace(Field::HnetPubkey, files::EF_SUCI_CALC_INFO, 0, suci::calc_info(c));
        let ri = suci::routing_indicator(&c.routing_indicator)
            .ok_or_else(unencodable(Field::RoutingIndicator))?;
        plan.replace(Field::RoutingIndicator, files::EF_ROUTING_INDICATOR, 0, ri);
        plan.set_bits(
            Field::ServiceTable,
            files::EF_UST,
            suci::UST_SUCI_OFFSET,
            suci::UST_SUCI_BY_ME,
            suci::UST_SUCI_BY_USIM,
        );
    }
    Ok(())
}

fn milenage_cfg(m: &MilenageParams) -> Vec<u8> {
    let mut data = Vec::with_capacity(MILENAGE_CFG_LEN);
    data.extend_from_slice(&m.r);
    for c in &m.c {
        data.extend_from_slice(c);
    }
    data
}

fn size_code(bits: u16, allowed: &[u16]) -> Option<u8> {
    allowed.iter().position(|b| *b == bits).map(|i| i as u8)
}

fn tuak_cfg(t: &TuakParams) -> Option<Vec<u8>> {
    let res = size_code(t.res_size, &[32, 64, 128, 256])?;
    let mac = size_code(t.mac_size, &[64, 128, 256])?;
    let ckik = size_code(t.ckik_size, &[128, 256])?;
    Some(vec![res | mac << 3 | ckik << 6, t.num_keccak])
}

fn sqn_cfg(s: &SqnPolicy) -> Vec<u8> {
    let flags = u8::from(s.check_enabled)
        | u8::from(s.age_limit_enabled) << 1
        | u8::from(s.max_delta_enabled) << 2
        | u8::from(s.check_skip_first) << 3;
    vec![flags, s.ind_size_bits]
}
