//! CSV file data adapter.
//!
//! - prices: wide, `date,T1,T2,...`; blank or `nan` cells are missing.
//! - scores: wide composite (`date,T1,T2,...`) or long multi-factor
//!   (`date,ticker,f1,f2,...`), told apart by the second header being `ticker`.
//! - sectors: `ticker,sector`.

use crate::domain::error::FactorTraderError;
use crate::domain::price_table::PriceTable;
use crate::domain::score_table::{CompositeScores, MultiFactorScores, ScoreTable};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    prices_path: PathBuf,
    scores_path: PathBuf,
    sectors_path: Option<PathBuf>,
}

impl CsvAdapter {
    pub fn new(prices_path: PathBuf, scores_path: PathBuf, sectors_path: Option<PathBuf>) -> Self {
        Self {
            prices_path,
            scores_path,
            sectors_path,
        }
    }
}

impl DataPort for CsvAdapter {
    fn load_prices(&self) -> Result<PriceTable, FactorTraderError> {
        let mut rdr = reader(&self.prices_path)?;
        let tickers: Vec<String> = headers(&mut rdr)?.iter().skip(1).map(str::to_string).collect();

        let mut rows: Vec<(NaiveDate, Vec<Option<f64>>)> = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(parse_error)?;
            let date = parse_date(record.get(0).unwrap_or_default())?;
            let values = record
                .iter()
                .skip(1)
                .map(parse_cell)
                .collect::<Result<Vec<_>, _>>()?;
            rows.push((date, values));
        }

        rows.sort_by_key(|(d, _)| *d);
        let (dates, rows) = rows.into_iter().unzip();
        PriceTable::new(dates, tickers, rows)
    }

    fn load_scores(&self) -> Result<ScoreTable, FactorTraderError> {
        let mut rdr = reader(&self.scores_path)?;
        let header = headers(&mut rdr)?;
        let long_format = header
            .get(1)
            .is_some_and(|h| h.trim().eq_ignore_ascii_case("ticker"));

        if long_format {
            let factors = header.iter().skip(2).map(str::to_string).collect();
            let mut scores = MultiFactorScores::new(factors)?;
            for result in rdr.records() {
                let record = result.map_err(parse_error)?;
                let date = parse_date(record.get(0).unwrap_or_default())?;
                let ticker = record.get(1).unwrap_or_default().trim();
                if ticker.is_empty() {
                    return Err(FactorTraderError::data(format!("missing ticker on {date}")));
                }
                let values = record
                    .iter()
                    .skip(2)
                    .map(parse_cell)
                    .collect::<Result<Vec<_>, _>>()?;
                scores.insert(date, ticker, values)?;
            }
            Ok(ScoreTable::MultiFactor(scores))
        } else {
            let tickers: Vec<String> = header.iter().skip(1).map(str::to_string).collect();
            let mut scores = CompositeScores::new();
            for result in rdr.records() {
                let record = result.map_err(parse_error)?;
                let date = parse_date(record.get(0).unwrap_or_default())?;
                scores.insert_empty_row(date);
                for (ticker, cell) in tickers.iter().zip(record.iter().skip(1)) {
                    if let Some(score) = parse_cell(cell)? {
                        scores.insert(date, ticker.as_str(), score);
                    }
                }
            }
            Ok(ScoreTable::Composite(scores))
        }
    }

    fn load_sectors(&self) -> Result<HashMap<String, String>, FactorTraderError> {
        let Some(path) = &self.sectors_path else {
            return Ok(HashMap::new());
        };
        let mut rdr = reader(path)?;
        let mut sectors = HashMap::new();
        for result in rdr.records() {
            let record = result.map_err(parse_error)?;
            let ticker = record.get(0).unwrap_or_default().trim();
            let sector = record.get(1).unwrap_or_default().trim();
            if !ticker.is_empty() && !sector.is_empty() {
                sectors.insert(ticker.to_string(), sector.to_string());
            }
        }
        Ok(sectors)
    }
}

fn reader(path: &Path) -> Result<csv::Reader<std::io::Cursor<Vec<u8>>>, FactorTraderError> {
    let content = fs::read(path).map_err(|e| {
        FactorTraderError::data(format!("failed to read {}: {}", path.display(), e))
    })?;
    Ok(csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(std::io::Cursor::new(content)))
}

fn headers(
    rdr: &mut csv::Reader<std::io::Cursor<Vec<u8>>>,
) -> Result<csv::StringRecord, FactorTraderError> {
    let header = rdr.headers().map_err(parse_error)?.clone();
    if header.len() < 2 {
        return Err(FactorTraderError::data(
            "CSV needs a date column and at least one data column",
        ));
    }
    Ok(header)
}

fn parse_error(e: csv::Error) -> FactorTraderError {
    FactorTraderError::data(format!("CSV parse error: {e}"))
}

/// `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(s: &str) -> Result<NaiveDate, FactorTraderError> {
    let day = s.trim().split([' ', 'T']).next().unwrap_or_default();
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| FactorTraderError::data(format!("invalid date '{s}': {e}")))
}

fn parse_cell(s: &str) -> Result<Option<f64>, FactorTraderError> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(Some)
        .map_err(|e| FactorTraderError::data(format!("invalid number '{s}': {e}")))
}
