//! CSV input and output, one row per card

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::{debug, info};

use super::{all_columns, InputError, RawRecord, REQUIRED_COLUMNS};

/// Read records from any reader; the header row names the columns
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<RawRecord>, InputError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(InputError::MissingColumns(missing));
    }

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let record: RawRecord = headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        records.push(record);
    }
    debug!("Parsed {} CSV rows", records.len());
    Ok(records)
}

/// Load a CSV file
pub fn load_csv(path: &Path) -> Result<Vec<RawRecord>, InputError> {
    let file = File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records = read_csv(file)?;
    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Write records as CSV
///
/// With `include_advanced` false only the required columns are written.
pub fn write_csv<W: Write>(
    writer: W,
    records: &[RawRecord],
    include_advanced: bool,
) -> Result<(), InputError> {
    let columns: Vec<&str> = if include_advanced {
        all_columns()
    } else {
        REQUIRED_COLUMNS.to_vec()
    };

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&columns)?;
    for record in records {
        wtr.write_record(columns.iter().map(|col| record.get(col).unwrap_or("")))?;
    }
    wtr.flush().map_err(|e| InputError::Csv(e.into()))?;
    Ok(())
}

/// Save records to a CSV file, replacing it
pub fn save_csv(
    path: &Path,
    records: &[RawRecord],
    include_advanced: bool,
) -> Result<(), InputError> {
    let file = File::create(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv(file, records, include_advanced)?;
    info!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}
