use std::fmt;

/// Format rules a field value can break
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatRule {
    ImsiDigits,
    IccidDigits,
    MncLength,
    Boolean,
    Hex,
    KiLength,
    OpcLength,
    /// COMP128 and XOR-2G only fit the 2G slot
    AlgorithmGeneration,
    MilenageR,
    MilenageC,
    TuakResSize,
    TuakMacSize,
    TuakCkikSize,
    TuakNumKeccak,
    SqnIndSize,
    Plmn,
    OplmnEntry,
    OplmnCount,
    RoutingIndicator,
    ProtectionScheme,
    PubkeyId,
    PubkeyLength,
    Adm1Digits,
}

impl fmt::Display for FormatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FormatRule::ImsiDigits => "must be exactly 15 digits",
            FormatRule::IccidDigits => "must be 19 or 20 digits",
            FormatRule::MncLength => "must be 1, 2 or 3",
            FormatRule::Boolean => "must be 0/1, true/false or yes/no",
            FormatRule::Hex => "must contain only hexadecimal characters",
            FormatRule::KiLength => "must be 32 hex characters (64 only with TUAK)",
            FormatRule::OpcLength => "must be 32 hex characters (64 TOPc only with TUAK)",
            FormatRule::AlgorithmGeneration => "algorithm is 2G only",
            FormatRule::MilenageR => "must be 2 hex characters",
            FormatRule::MilenageC => "must be 32 hex characters",
            FormatRule::TuakResSize => "must be 32, 64, 128 or 256",
            FormatRule::TuakMacSize => "must be 64, 128 or 256",
            FormatRule::TuakCkikSize => "must be 128 or 256",
            FormatRule::TuakNumKeccak => "must be between 1 and 255",
            FormatRule::SqnIndSize => "must be between 0 and 31",
            FormatRule::Plmn => "must be 5 or 6 digits (MCC + MNC)",
            FormatRule::OplmnEntry => "entries must be PLMN:ACT with ACT as 4 hex digits",
            FormatRule::OplmnCount => "at most 40 entries",
            FormatRule::RoutingIndicator => "must be 4 hex digits",
            FormatRule::ProtectionScheme => "must be 0 (null), 1 (profile A) or 2 (profile B)",
            FormatRule::PubkeyId => "must be between 1 and 255",
            FormatRule::PubkeyLength => "must be 32 bytes for profile A, 33 bytes for profile B",
            FormatRule::Adm1Digits => "must be exactly 8 digits",
        };
        f.write_str(text)
    }
}
