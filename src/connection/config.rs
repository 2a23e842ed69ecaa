use crate::core::{Result, TxnError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Read isolation requested for transactional reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadConcern {
    Local,
    Available,
    Majority,
    Linearizable,
    Snapshot,
}

/// How many members must acknowledge a write before it counts as durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acknowledgment {
    Majority,
    Nodes(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriteConcern {
    pub w: Acknowledgment,
    /// Store-level acknowledgment timeout in milliseconds
    pub wtimeout_ms: u64,
}

impl WriteConcern {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.wtimeout_ms)
    }
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self {
            w: Acknowledgment::Majority,
            wtimeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

/// Store-level transaction parameters
///
/// Supplied once when a manager is constructed and never mutated afterwards.
/// Fields missing from a partial JSON document fall back to the defaults:
/// `snapshot` reads, `majority` writes with a 3000ms timeout, `primary` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransactionOptions {
    pub read_concern: ReadConcern,
    pub write_concern: WriteConcern,
    pub read_preference: ReadPreference,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read concern
    pub fn read_concern(mut self, level: ReadConcern) -> Self {
        self.read_concern = level;
        self
    }

    /// Set the write concern acknowledgment and timeout
    pub fn write_concern(mut self, w: Acknowledgment, timeout: Duration) -> Self {
        self.write_concern = WriteConcern {
            w,
            wtimeout_ms: timeout.as_millis() as u64,
        };
        self
    }

    /// Set the read preference
    pub fn read_preference(mut self, preference: ReadPreference) -> Self {
        self.read_preference = preference;
        self
    }

    /// Parse a (possibly partial) JSON document merged over the defaults
    ///
    /// # Examples
    ///
    /// ```
    /// # use sessiontx::{TransactionOptions, ReadConcern};
    /// let options = TransactionOptions::from_json(r#"{"readConcern": "majority"}"#).unwrap();
    /// assert_eq!(options.read_concern, ReadConcern::Majority);
    /// assert_eq!(options.write_concern.wtimeout_ms, 3000);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| TxnError::Config(format!("invalid transaction options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.write_concern.wtimeout_ms == 0 {
            return Err(TxnError::Config("write concern timeout must be > 0".into()));
        }

        if self.write_concern.w == Acknowledgment::Nodes(0) {
            return Err(TxnError::Config(
                "transactions require an acknowledged write concern".into(),
            ));
        }

        Ok(())
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            read_concern: ReadConcern::Snapshot,
            write_concern: WriteConcern::default(),
            read_preference: ReadPreference::Primary,
        }
    }
}

impl fmt::Display for TransactionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "readConcern={:?} w={:?} wtimeout={}ms readPreference={:?}",
            self.read_concern,
            self.write_concern.w,
            self.write_concern.wtimeout_ms,
            self.read_preference
        )
    }
}
