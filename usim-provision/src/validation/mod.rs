//! Record validation
//!
//! [`validate`] maps a raw record to diagnostics and has no side effects:
//! the same input always gives the same diagnostics in the same order. A
//! record is programmable only when the list is empty; a bad optional field
//! blocks the whole record.
//!
//! Without a target card type, algorithms are checked against the most
//! permissive family (SJA5). [`check_capabilities`] re-checks a parsed record
//! once the real card type is known.

mod rules;

pub use rules::FormatRule;

use std::fmt;
use std::ops::RangeInclusive;

use crate::card::{Algorithm, CardTypeVariant, Generation};
use crate::config::{
    Adm1Key, Concealment, ConfigurationRecord, Field, MilenageParams, NetworkSelection, OplmnEntry,
    SecretBytes, SqnPolicy, TuakParams,
};
use crate::records::{RawRecord, CONCEALMENT_COLUMNS, MILENAGE_COLUMNS, SQN_COLUMNS, TUAK_COLUMNS};

/// Most OPLMNwAcT entries a card holds
pub const MAX_OPLMN_ENTRIES: usize = 40;

/// What is wrong with a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    MissingRequired,
    FormatInvalid(FormatRule),
    AlgorithmUnknown(String),
    /// Valid on its own but not on this card type
    CapabilityViolation(CardTypeVariant),
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::MissingRequired => f.write_str("required value missing"),
            DiagnosticKind::FormatInvalid(rule) => write!(f, "{}", rule),
            DiagnosticKind::AlgorithmUnknown(token) => write!(f, "unknown algorithm '{}'", token),
            DiagnosticKind::CapabilityViolation(variant) => {
                write!(f, "not supported by {}", variant.product_name())
            }
        }
    }
}

/// One problem with one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub field: Field,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(field: Field, kind: DiagnosticKind) -> Self {
        Self { field, kind }
    }

    fn missing(field: Field) -> Self {
        Self::new(field, DiagnosticKind::MissingRequired)
    }

    fn format(field: Field, rule: FormatRule) -> Self {
        Self::new(field, DiagnosticKind::FormatInvalid(rule))
    }

    fn capability(field: Field, variant: CardTypeVariant) -> Self {
        Self::new(field, DiagnosticKind::CapabilityViolation(variant))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind)
    }
}

/// Check a raw record, optionally against a known card type
pub fn validate(raw: &RawRecord, target: Option<CardTypeVariant>) -> Vec<Diagnostic> {
    run(raw, target).0
}

/// Parse a raw record that passes generic validation
pub fn parse(raw: &RawRecord) -> Result<ConfigurationRecord, Vec<Diagnostic>> {
    match run(raw, None) {
        (diagnostics, Some(record)) if diagnostics.is_empty() => Ok(record),
        (diagnostics, _) => Err(diagnostics),
    }
}

/// Re-check a parsed record against the card type actually inserted
pub fn check_capabilities(
    record: &ConfigurationRecord,
    variant: CardTypeVariant,
) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let mut algorithms_ok = true;
    for generation in Generation::ALL {
        if let Some(d) = algorithm_problem(variant, generation, record.algorithm(generation)) {
            diags.push(d);
            algorithms_ok = false;
        }
    }
    if algorithms_ok {
        diags.extend(slot_problem(variant, record.algo_3g, record.algo_4g5g));
    }
    diags.extend(key_length_problem(variant, Field::Ki, record.ki.len()));
    if let Some(opc) = &record.opc {
        diags.extend(key_length_problem(variant, Field::Opc, opc.len()));
    }

    let caps = variant.capabilities();
    if record.tuak.is_some() && !caps.tuak {
        diags.extend(
            [
                Field::TuakResSize,
                Field::TuakMacSize,
                Field::TuakCkikSize,
                Field::TuakNumKeccak,
            ]
            .into_iter()
            .map(|f| Diagnostic::capability(f, variant)),
        );
    }
    if record.concealment.is_some() && !caps.concealment {
        diags.extend(
            [
                Field::RoutingIndicator,
                Field::ProtectionSchemeId,
                Field::HnetPubkeyId,
                Field::HnetPubkey,
            ]
            .into_iter()
            .map(|f| Diagnostic::capability(f, variant)),
        );
    }
    diags
}

fn algorithm_problem(
    variant: CardTypeVariant,
    generation: Generation,
    algo: Algorithm,
) -> Option<Diagnostic> {
    let field = Field::Algorithm(generation);
    if !algo.serves(generation) {
        return Some(Diagnostic::format(field, FormatRule::AlgorithmGeneration));
    }
    if !variant.capabilities().supports(algo, generation) {
        return Some(Diagnostic::capability(field, variant));
    }
    None
}

/// SJS1 runs 4G/5G through the 3G slot
fn slot_problem(
    variant: CardTypeVariant,
    algo_3g: Algorithm,
    algo_4g5g: Algorithm,
) -> Option<Diagnostic> {
    if !variant.capabilities().separate_4g5g_slot && algo_3g != algo_4g5g {
        return Some(Diagnostic::capability(Field::Algorithm(Generation::FourFiveG), variant));
    }
    None
}

fn key_length_problem(variant: CardTypeVariant, field: Field, len: usize) -> Option<Diagnostic> {
    if len == 32 && !variant.capabilities().long_keys {
        return Some(Diagnostic::capability(field, variant));
    }
    None
}

fn collect<T>(diags: &mut Vec<Diagnostic>, result: Result<T, Diagnostic>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(d) => {
            diags.push(d);
            None
        }
    }
}

fn required(r: &RawRecord, field: Field) -> Result<&str, Diagnostic> {
    r.get(field.column()).ok_or_else(|| Diagnostic::missing(field))
}

fn ensure(ok: bool, field: Field, rule: FormatRule) -> Result<(), Diagnostic> {
    if ok {
        Ok(())
    } else {
        Err(Diagnostic::format(field, rule))
    }
}

fn is_digits(v: &str, len: RangeInclusive<usize>) -> bool {
    len.contains(&v.len()) && v.bytes().all(|b| b.is_ascii_digit())
}

fn is_hex(v: &str) -> bool {
    !v.is_empty() && v.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Non-hex characters break `Hex`; an odd digit count breaks `rule`
fn decode_hex(v: &str, field: Field, rule: FormatRule) -> Result<Vec<u8>, Diagnostic> {
    if !is_hex(v) {
        return Err(Diagnostic::format(field, FormatRule::Hex));
    }
    hex::decode(v).map_err(|_| Diagnostic::format(field, rule))
}

fn fixed_hex<const N: usize>(
    r: &RawRecord,
    field: Field,
    rule: FormatRule,
) -> Result<[u8; N], Diagnostic> {
    let bytes = decode_hex(required(r, field)?, field, rule)?;
    bytes
        .try_into()
        .map_err(|_| Diagnostic::format(field, rule))
}

fn number<T>(
    r: &RawRecord,
    field: Field,
    range: RangeInclusive<T>,
    rule: FormatRule,
) -> Result<T, Diagnostic>
where
    T: std::str::FromStr + PartialOrd,
{
    let v = required(r, field)?;
    match v.parse::<T>() {
        Ok(n) if range.contains(&n) => Ok(n),
        _ => Err(Diagnostic::format(field, rule)),
    }
}

fn choice(
    r: &RawRecord,
    field: Field,
    allowed: &[u16],
    rule: FormatRule,
) -> Result<u16, Diagnostic> {
    let v = required(r, field)?;
    match v.parse::<u16>() {
        Ok(n) if allowed.contains(&n) => Ok(n),
        _ => Err(Diagnostic::format(field, rule)),
    }
}

fn boolean(r: &RawRecord, field: Field) -> Result<bool, Diagnostic> {
    let v = required(r, field)?;
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(Diagnostic::format(field, FormatRule::Boolean)),
    }
}

/// Ki or OPc material
fn key_material(
    v: &str,
    field: Field,
    rule: FormatRule,
    tuak: bool,
    variant: CardTypeVariant,
) -> Result<SecretBytes, Diagnostic> {
    let bytes = decode_hex(v, field, rule)?;
    match bytes.len() {
        16 => {}
        32 if tuak => {
            if let Some(d) = key_length_problem(variant, field, 32) {
                return Err(d);
            }
        }
        _ => return Err(Diagnostic::format(field, rule)),
    }
    Ok(SecretBytes::new(bytes))
}

fn plmn_ok(v: &str) -> bool {
    is_digits(v, 5..=6)
}

fn oplmn_list(v: &str) -> Result<Vec<OplmnEntry>, Diagnostic> {
    let field = Field::OplmnAct;
    let mut entries = Vec::new();
    for item in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (plmn, act) = item
            .split_once(':')
            .ok_or_else(|| Diagnostic::format(field, FormatRule::OplmnEntry))?;
        let (plmn, act) = (plmn.trim(), act.trim());
        if !plmn_ok(plmn) || act.len() != 4 || !is_hex(act) {
            return Err(Diagnostic::format(field, FormatRule::OplmnEntry));
        }
        let act = u16::from_str_radix(act, 16)
            .map_err(|_| Diagnostic::format(field, FormatRule::OplmnEntry))?;
        entries.push(OplmnEntry {
            plmn: plmn.to_string(),
            act,
        });
    }
    ensure(entries.len() <= MAX_OPLMN_ENTRIES, field, FormatRule::OplmnCount)?;
    Ok(entries)
}

/// Columns of a group the operator actually filled in
fn touched<'a>(raw: &RawRecord, columns: &'a [&'a str]) -> Vec<&'a str> {
    columns.iter().copied().filter(|c| raw.is_set(c)).collect()
}

fn field_for_column(column: &str) -> Option<Field> {
    const CANDIDATES: [Field; 8] = [
        Field::TuakResSize,
        Field::TuakMacSize,
        Field::TuakCkikSize,
        Field::TuakNumKeccak,
        Field::RoutingIndicator,
        Field::ProtectionSchemeId,
        Field::HnetPubkeyId,
        Field::HnetPubkey,
    ];
    CANDIDATES.into_iter().find(|f| f.column() == column)
}

fn run(
    raw: &RawRecord,
    target: Option<CardTypeVariant>,
) -> (Vec<Diagnostic>, Option<ConfigurationRecord>) {
    let r = raw.with_defaults();
    let variant = target.unwrap_or(CardTypeVariant::Sja5);
    let caps = variant.capabilities();
    let mut diags = Vec::new();

    // Identity
    let imsi = collect(
        &mut diags,
        required(&r, Field::Imsi).and_then(|v| {
            ensure(is_digits(v, 15..=15), Field::Imsi, FormatRule::ImsiDigits)
                .map(|_| v.to_string())
        }),
    );
    let iccid = collect(
        &mut diags,
        required(&r, Field::Iccid).and_then(|v| {
            ensure(is_digits(v, 19..=20), Field::Iccid, FormatRule::IccidDigits)
                .map(|_| v.to_string())
        }),
    );
    let mnc_length = collect(
        &mut diags,
        number::<u8>(&r, Field::MncLength, 1..=3, FormatRule::MncLength),
    );

    // Algorithms
    let mut algos: [Option<Algorithm>; 3] = [None; 3];
    for (slot, generation) in Generation::ALL.into_iter().enumerate() {
        let field = Field::Algorithm(generation);
        let Some(token) = collect(&mut diags, required(&r, field)) else {
            continue;
        };
        match token.parse::<Algorithm>() {
            Ok(algo) => {
                diags.extend(algorithm_problem(variant, generation, algo));
                algos[slot] = Some(algo);
            }
            Err(_) => diags.push(Diagnostic::new(
                field,
                DiagnosticKind::AlgorithmUnknown(token.to_string()),
            )),
        }
    }
    if let [_, Some(a3), Some(a4)] = algos {
        let already = diags
            .iter()
            .any(|d| d.field == Field::Algorithm(Generation::FourFiveG));
        if !already {
            diags.extend(slot_problem(variant, a3, a4));
        }
    }
    let tuak_used = algos.iter().flatten().any(|a| *a == Algorithm::Tuak);
    let opc_needed = algos.iter().flatten().any(|a| a.needs_opc());

    // Key material
    let ki = collect(
        &mut diags,
        required(&r, Field::Ki)
            .and_then(|v| key_material(v, Field::Ki, FormatRule::KiLength, tuak_used, variant)),
    );
    let opc = collect(
        &mut diags,
        match r.get(Field::Opc.column()) {
            Some(v) => {
                key_material(v, Field::Opc, FormatRule::OpcLength, tuak_used, variant).map(Some)
            }
            None if opc_needed => Err(Diagnostic::missing(Field::Opc)),
            None => Ok(None),
        },
    );
    let use_opc = collect(&mut diags, boolean(&r, Field::UseOpc));

    // Milenage constants
    let milenage = if MILENAGE_COLUMNS.iter().any(|c| r.is_set(c)) {
        let mut params = MilenageParams {
            r: [0; 5],
            c: [[0; 16]; 5],
        };
        let before = diags.len();
        for i in 0..5 {
            let rotation = fixed_hex::<1>(&r, Field::MilenageR(i), FormatRule::MilenageR);
            if let Some([b]) = collect(&mut diags, rotation) {
                params.r[i] = b;
            }
            let constant = fixed_hex::<16>(&r, Field::MilenageC(i), FormatRule::MilenageC);
            if let Some(c) = collect(&mut diags, constant) {
                params.c[i] = c;
            }
        }
        (diags.len() == before).then_some(params)
    } else {
        None
    };

    // TUAK parameters
    let tuak = if TUAK_COLUMNS.iter().any(|c| r.is_set(c)) {
        if !caps.tuak {
            diags.extend(
                touched(raw, &TUAK_COLUMNS)
                    .into_iter()
                    .filter_map(field_for_column)
                    .map(|f| Diagnostic::capability(f, variant)),
            );
        }
        let res_size = collect(
            &mut diags,
            choice(&r, Field::TuakResSize, &[32, 64, 128, 256], FormatRule::TuakResSize),
        );
        let mac_size = collect(
            &mut diags,
            choice(&r, Field::TuakMacSize, &[64, 128, 256], FormatRule::TuakMacSize),
        );
        let ckik_size = collect(
            &mut diags,
            choice(&r, Field::TuakCkikSize, &[128, 256], FormatRule::TuakCkikSize),
        );
        let num_keccak = collect(
            &mut diags,
            number::<u8>(&r, Field::TuakNumKeccak, 1..=255, FormatRule::TuakNumKeccak),
        );
        match (res_size, mac_size, ckik_size, num_keccak) {
            (Some(res_size), Some(mac_size), Some(ckik_size), Some(num_keccak)) => Some(TuakParams {
                res_size,
                mac_size,
                ckik_size,
                num_keccak,
            }),
            _ => None,
        }
    } else {
        None
    };

    // SQN policy
    let sqn = if SQN_COLUMNS.iter().any(|c| r.is_set(c)) {
        let ind = collect(
            &mut diags,
            number::<u8>(&r, Field::SqnIndSizeBits, 0..=31, FormatRule::SqnIndSize),
        );
        let check = collect(&mut diags, boolean(&r, Field::SqnCheckEnabled));
        let age = collect(&mut diags, boolean(&r, Field::SqnAgeLimitEnabled));
        let delta = collect(&mut diags, boolean(&r, Field::SqnMaxDeltaEnabled));
        let skip = collect(&mut diags, boolean(&r, Field::SqnCheckSkipFirst));
        match (ind, check, age, delta, skip) {
            (
                Some(ind_size_bits),
                Some(check_enabled),
                Some(age_limit_enabled),
                Some(max_delta_enabled),
                Some(check_skip_first),
            ) => Some(SqnPolicy {
                ind_size_bits,
                check_enabled,
                age_limit_enabled,
                max_delta_enabled,
                check_skip_first,
            }),
            _ => None,
        }
    } else {
        None
    };

    // Network selection
    let hplmn = collect(
        &mut diags,
        match r.get(Field::Hplmn.column()) {
            Some(v) => {
                ensure(plmn_ok(v), Field::Hplmn, FormatRule::Plmn).map(|_| Some(v.to_string()))
            }
            None => Ok(None),
        },
    )
    .flatten();
    let oplmn = collect(
        &mut diags,
        r.get(Field::OplmnAct.column()).map(oplmn_list).unwrap_or(Ok(Vec::new())),
    )
    .unwrap_or_default();
    let network = (hplmn.is_some() || !oplmn.is_empty()).then(|| NetworkSelection { hplmn, oplmn });

    // 5G concealment
    let concealment = if CONCEALMENT_COLUMNS.iter().any(|c| r.is_set(c)) {
        if !caps.concealment {
            diags.extend(
                touched(raw, &CONCEALMENT_COLUMNS)
                    .into_iter()
                    .filter_map(field_for_column)
                    .map(|f| Diagnostic::capability(f, variant)),
            );
        }
        let routing_indicator = collect(
            &mut diags,
            required(&r, Field::RoutingIndicator).and_then(|v| {
                ensure(
                    v.len() == 4 && is_hex(v),
                    Field::RoutingIndicator,
                    FormatRule::RoutingIndicator,
                )
                .map(|_| v.to_ascii_uppercase())
            }),
        );
        let scheme = collect(
            &mut diags,
            number::<u8>(&r, Field::ProtectionSchemeId, 0..=2, FormatRule::ProtectionScheme),
        );
        let pubkey_id = collect(
            &mut diags,
            number::<u8>(&r, Field::HnetPubkeyId, 1..=255, FormatRule::PubkeyId),
        );
        let pubkey = scheme.and_then(|scheme| {
            let result = match (scheme, r.get(Field::HnetPubkey.column())) {
                (0, None) => Ok(Vec::new()),
                (_, None) => Err(Diagnostic::missing(Field::HnetPubkey)),
                (scheme, Some(v)) => {
                    decode_hex(v, Field::HnetPubkey, FormatRule::PubkeyLength).and_then(|key| {
                        let expected = match scheme {
                            1 => Some(32),
                            2 => Some(33),
                            _ => None,
                        };
                        ensure(
                            expected.map_or(true, |n| key.len() == n),
                            Field::HnetPubkey,
                            FormatRule::PubkeyLength,
                        )
                        .map(|_| key)
                    })
                }
            };
            collect(&mut diags, result)
        });
        match (routing_indicator, scheme, pubkey_id, pubkey) {
            (Some(routing_indicator), Some(protection_scheme), Some(pubkey_id), Some(pubkey)) => {
                Some(Concealment {
                    routing_indicator,
                    protection_scheme,
                    pubkey_id,
                    pubkey,
                })
            }
            _ => None,
        }
    } else {
        None
    };

    let adm1 = collect(
        &mut diags,
        match r.get(Field::Adm1.column()) {
            Some(v) => Adm1Key::parse(v)
                .map(Some)
                .map_err(|_| Diagnostic::format(Field::Adm1, FormatRule::Adm1Digits)),
            None => Ok(None),
        },
    )
    .flatten();

    if !diags.is_empty() {
        return (diags, None);
    }

    let record = match (imsi, iccid, mnc_length, ki, opc, use_opc, algos) {
        (
            Some(imsi),
            Some(iccid),
            Some(mnc_length),
            Some(ki),
            Some(opc),
            Some(use_opc),
            [Some(algo_2g), Some(algo_3g), Some(algo_4g5g)],
        ) => Some(ConfigurationRecord {
            imsi,
            iccid,
            mnc_length,
            ki,
            opc,
            use_opc,
            algo_2g,
            algo_3g,
            algo_4g5g,
            milenage,
            tuak,
            sqn,
            network,
            concealment,
            adm1,
        }),
        _ => None,
    };
    (diags, record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::columns::*;

    fn base() -> RawRecord {
        RawRecord::new()
            .with(IMSI, "001010000000001")
            .with(ICCID, "8988211000000000001")
            .with(KI, "000102030405060708090A0B0C0D0E0F")
            .with(OPC, "ABCDEF0123456789ABCDEF0123456789")
            .with(ALGO_2G, "MILENAGE")
            .with(ALGO_3G, "MILENAGE")
            .with(ALGO_4G5G, "MILENAGE")
            .with(MNC_LENGTH, "2")
    }

    fn fields(diags: &[Diagnostic]) -> Vec<Field> {
        diags.iter().map(|d| d.field).collect()
    }

    #[test]
    fn test_valid_record_parses() {
        let record = ConfigurationRecord::from_raw(&base()).unwrap();
        assert_eq!(record.imsi, "001010000000001");
        assert_eq!(record.mnc_length, 2);
        assert!(record.use_opc);
        assert_eq!(record.ki.len(), 16);
        assert!(record.milenage.is_none());
        assert!(record.network.is_none());
    }

    #[test]
    fn test_short_imsi() {
        let diags = validate(&base().with(IMSI, "00101000000001"), None);
        assert_eq!(
            diags,
            vec![Diagnostic::format(Field::Imsi, FormatRule::ImsiDigits)]
        );
    }

    #[test]
    fn test_missing_required() {
        let mut raw = base();
        raw.remove(IMSI);
        raw.remove(KI);
        let diags = validate(&raw, None);
        assert_eq!(fields(&diags), vec![Field::Imsi, Field::Ki]);
        assert!(diags.iter().all(|d| d.kind == DiagnosticKind::MissingRequired));
    }

    #[test]
    fn test_algorithm_defaults_fill_blank_columns() {
        let raw = base().with(ALGO_2G, "").with(MNC_LENGTH, "");
        let record = ConfigurationRecord::from_raw(&raw).unwrap();
        assert_eq!(record.algo_2g, Algorithm::Milenage);
        assert_eq!(record.mnc_length, 2);
    }

    #[test]
    fn test_unknown_algorithm_token() {
        let diags = validate(&base().with(ALGO_3G, "MILENAGE-X"), None);
        assert_eq!(
            diags,
            vec![Diagnostic::new(
                Field::Algorithm(Generation::ThreeG),
                DiagnosticKind::AlgorithmUnknown("MILENAGE-X".into())
            )]
        );
    }

    #[test]
    fn test_comp128_in_3g_slot_is_format_error() {
        let diags = validate(&base().with(ALGO_3G, "COMP128v2"), None);
        assert_eq!(
            diags[0].kind,
            DiagnosticKind::FormatInvalid(FormatRule::AlgorithmGeneration)
        );
    }

    #[test]
    fn test_tuak_capability_by_variant() {
        let raw = base().with(ALGO_4G5G, "TUAK");
        assert!(validate(&raw, None).is_empty());
        assert!(validate(&raw, Some(CardTypeVariant::Sja5)).is_empty());

        let diags = validate(&raw, Some(CardTypeVariant::Sjs1));
        assert_eq!(
            diags,
            vec![Diagnostic::capability(
                Field::Algorithm(Generation::FourFiveG),
                CardTypeVariant::Sjs1
            )]
        );
        assert!(!validate(&raw, Some(CardTypeVariant::Sja2)).is_empty());
    }

    #[test]
    fn test_sjs1_requires_matching_4g5g() {
        let raw = base().with(ALGO_4G5G, "SHA1-AKA");
        assert!(validate(&raw, Some(CardTypeVariant::Sja2)).is_empty());
        let diags = validate(&raw, Some(CardTypeVariant::Sjs1));
        assert_eq!(fields(&diags), vec![Field::Algorithm(Generation::FourFiveG)]);
    }

    #[test]
    fn test_opc_only_required_when_used() {
        let mut raw = base()
            .with(ALGO_2G, "COMP128v1")
            .with(ALGO_3G, "XOR")
            .with(ALGO_4G5G, "XOR");
        raw.remove(OPC);
        assert!(validate(&raw, None).is_empty());

        let mut raw = base();
        raw.remove(OPC);
        assert_eq!(
            validate(&raw, None),
            vec![Diagnostic::missing(Field::Opc)]
        );
    }

    #[test]
    fn test_long_key_needs_tuak() {
        let long = "00".repeat(32);
        let diags = validate(&base().with(KI, &long), None);
        assert_eq!(diags, vec![Diagnostic::format(Field::Ki, FormatRule::KiLength)]);

        let raw = base().with(KI, &long).with(ALGO_3G, "TUAK").with(ALGO_4G5G, "TUAK");
        assert!(validate(&raw, None).is_empty());
        let record = ConfigurationRecord::from_raw(&raw).unwrap();
        assert_eq!(record.ki.len(), 32);
    }

    #[test]
    fn test_non_hex_key() {
        let diags = validate(&base().with(OPC, "ZZCDEF0123456789ABCDEF0123456789"), None);
        assert_eq!(diags, vec![Diagnostic::format(Field::Opc, FormatRule::Hex)]);
    }

    #[test]
    fn test_bad_optional_field_blocks_record() {
        let raw = base().with(MILENAGE_R[2], "4");
        let diags = validate(&raw, None);
        assert_eq!(diags, vec![Diagnostic::format(Field::MilenageR(2), FormatRule::MilenageR)]);
        assert!(ConfigurationRecord::from_raw(&raw).is_err());
    }

    #[test]
    fn test_milenage_group_defaults() {
        let record = ConfigurationRecord::from_raw(&base().with(MILENAGE_R[0], "41")).unwrap();
        let m = record.milenage.unwrap();
        assert_eq!(m.r, [0x41, 0x00, 0x20, 0x40, 0x60]);
        assert_eq!(m.c[4][15], 0x08);
    }

    #[test]
    fn test_tuak_sizes() {
        let raw = base().with(TUAK_RES_SIZE, "96");
        assert_eq!(
            validate(&raw, None),
            vec![Diagnostic::format(Field::TuakResSize, FormatRule::TuakResSize)]
        );
        let raw = base().with(TUAK_NUM_KECCAK, "0");
        assert_eq!(fields(&validate(&raw, None)), vec![Field::TuakNumKeccak]);

        let raw = base().with(TUAK_MAC_SIZE, "256");
        let diags = validate(&raw, Some(CardTypeVariant::Sja2));
        assert_eq!(diags, vec![Diagnostic::capability(Field::TuakMacSize, CardTypeVariant::Sja2)]);
    }

    #[test]
    fn test_sqn_policy() {
        let record = ConfigurationRecord::from_raw(&base().with(SQN_IND_SIZE_BITS, "7")).unwrap();
        let sqn = record.sqn.unwrap();
        assert_eq!(sqn.ind_size_bits, 7);
        assert!(sqn.check_enabled && !sqn.age_limit_enabled && sqn.max_delta_enabled);

        let diags = validate(&base().with(SQN_CHECK_ENABLED, "maybe"), None);
        assert_eq!(diags, vec![Diagnostic::format(Field::SqnCheckEnabled, FormatRule::Boolean)]);
        let diags = validate(&base().with(SQN_IND_SIZE_BITS, "32"), None);
        assert_eq!(fields(&diags), vec![Field::SqnIndSizeBits]);
    }

    #[test]
    fn test_network_fields() {
        let raw = base().with(HPLMN, "24001").with(OPLMN_ACT, "24002:8000, 310410:C080");
        let record = ConfigurationRecord::from_raw(&raw).unwrap();
        let net = record.network.unwrap();
        assert_eq!(net.hplmn.as_deref(), Some("24001"));
        assert_eq!(net.oplmn.len(), 2);
        assert_eq!(net.oplmn[1].act, 0xC080);

        assert_eq!(fields(&validate(&base().with(HPLMN, "2400"), None)), vec![Field::Hplmn]);
        assert_eq!(
            validate(&base().with(OPLMN_ACT, "24002-8000"), None),
            vec![Diagnostic::format(Field::OplmnAct, FormatRule::OplmnEntry)]
        );
        let many = vec!["24001:8000"; 41].join(",");
        assert_eq!(
            validate(&base().with(OPLMN_ACT, &many), None),
            vec![Diagnostic::format(Field::OplmnAct, FormatRule::OplmnCount)]
        );
    }

    #[test]
    fn test_concealment_rules() {
        let key = "11".repeat(32);
        let raw = base().with(HNET_PUBKEY, &key);
        let record = ConfigurationRecord::from_raw(&raw).unwrap();
        let c = record.concealment.unwrap();
        assert_eq!((c.protection_scheme, c.pubkey_id), (1, 1));
        assert_eq!(c.routing_indicator, "0000");

        // Profile B keys are compressed points
        let raw = base().with(HNET_PUBKEY, &key).with(PROTECTION_SCHEME_ID, "2");
        assert_eq!(
            validate(&raw, None),
            vec![Diagnostic::format(Field::HnetPubkey, FormatRule::PubkeyLength)]
        );

        let raw = base().with(ROUTING_INDICATOR, "12");
        let diags = validate(&raw, None);
        assert_eq!(fields(&diags), vec![Field::RoutingIndicator, Field::HnetPubkey]);

        let raw = base().with(PROTECTION_SCHEME_ID, "0");
        assert!(validate(&raw, None).is_empty());

        let raw = base().with(HNET_PUBKEY, &key);
        let diags = validate(&raw, Some(CardTypeVariant::Sja2));
        assert_eq!(diags, vec![Diagnostic::capability(Field::HnetPubkey, CardTypeVariant::Sja2)]);
    }

    #[test]
    fn test_adm1_column() {
        let record = ConfigurationRecord::from_raw(&base().with(ADM1, "12345678")).unwrap();
        assert!(record.adm1.is_some());
        assert_eq!(
            validate(&base().with(ADM1, "1234"), None),
            vec![Diagnostic::format(Field::Adm1, FormatRule::Adm1Digits)]
        );
    }

    #[test]
    fn test_validation_is_pure() {
        let bad = base().with(IMSI, "1234").with(ALGO_4G5G, "TUAK");
        let first = validate(&bad, Some(CardTypeVariant::Sjs1));
        for _ in 0..5 {
            let _ = validate(&base(), None);
            assert_eq!(validate(&bad, Some(CardTypeVariant::Sjs1)), first);
        }
    }

    #[test]
    fn test_check_capabilities_matches_validate() {
        let raw = base().with(ALGO_3G, "TUAK").with(ALGO_4G5G, "TUAK");
        let record = ConfigurationRecord::from_raw(&raw).unwrap();
        assert!(check_capabilities(&record, CardTypeVariant::Sja5).is_empty());
        for variant in [CardTypeVariant::Sja2, CardTypeVariant::Sjs1] {
            assert_eq!(
                fields(&check_capabilities(&record, variant)),
                fields(&validate(&raw, Some(variant)))
            );
        }
    }
}
