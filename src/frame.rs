//! Column-oriented OHLCV table
//!
//! For callers holding data as named columns (CSV readers, dataframe
//! exports). Column names match case-insensitively; `High`, `Low` and
//! `Close` are required, `Open` and `Volume` are optional.

use std::collections::BTreeMap;

use crate::{Bar, BarTime, EngineError, Result};

const REQUIRED: [&str; 3] = ["high", "low", "close"];

/// Named numeric columns over a timestamp index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OhlcvFrame {
    index: Vec<BarTime>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl OhlcvFrame {
    pub fn new(index: Vec<BarTime>) -> Self {
        Self {
            index,
            columns: BTreeMap::new(),
        }
    }

    /// Add or replace a column
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Self {
        self.columns.insert(name.to_ascii_lowercase(), values);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    /// Row view of the table. Fails on missing required columns or
    /// columns whose length differs from the index.
    pub fn to_bars(&self) -> Result<Vec<Bar>> {
        let missing: Vec<&str> = REQUIRED
            .iter()
            .copied()
            .filter(|name| self.column(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::MissingColumns(missing.join(", ")));
        }

        let high = self.sized_column("high")?.unwrap_or_default();
        let low = self.sized_column("low")?.unwrap_or_default();
        let close = self.sized_column("close")?.unwrap_or_default();
        let open = self.sized_column("open")?;
        let volume = self.sized_column("volume")?;

        Ok(self
            .index
            .iter()
            .enumerate()
            .map(|(i, &time)| Bar {
                time,
                open: open.map_or(close[i], |o| o[i]),
                high: high[i],
                low: low[i],
                close: close[i],
                volume: volume.map(|v| v[i]),
            })
            .collect())
    }

    fn sized_column(&self, name: &'static str) -> Result<Option<&[f64]>> {
        match self.column(name) {
            Some(values) if values.len() != self.index.len() => Err(EngineError::ColumnLength {
                column: name,
                expected: self.index.len(),
                got: values.len(),
            }),
            other => Ok(other),
        }
    }
}
