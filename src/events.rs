//! Append-only observation log consumed by off-chain collaborators.
//!
//! Oracle agents and dashboards poll [`EventLog::since`] with the last
//! sequence number they processed.  Delivery is at-least-once, so consumers
//! must tolerate seeing the same record twice.

use crate::error::Result;
use crate::flight::{FlightKey, StatusCode};
use crate::identity::{Address, Balance};
use crate::prng::INDICES_PER_ORACLE;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Observable state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SuretyEvent {
    /// Candidate airline awaiting votes.
    AirlineApplied {
        /// Candidate address.
        airline: Address,
        /// Candidate name.
        name: String,
        /// Participant that created the candidate record.
        by: Address,
    },
    /// Airline admitted to the registry.
    AirlineRegistered {
        /// Admitted airline.
        airline: Address,
        /// Airline name.
        name: String,
        /// Votes held at admission (zero for bootstrap admissions).
        votes: usize,
    },
    /// Airline met the funding minimum and became a participant.
    AirlineFunded {
        /// Funded airline.
        airline: Address,
        /// Amount paid.
        amount: Balance,
    },
    /// Participant airline registered a flight.
    FlightRegistered {
        /// Flight key.
        key: FlightKey,
        /// Sequential purchase option id.
        option_id: u64,
        /// Operating airline.
        airline: Address,
        /// Flight designator.
        code: String,
        /// Departure time (Unix seconds, UTC).
        timestamp: i64,
    },
    /// Oracle registered and received its indices.
    OracleRegistered {
        /// Oracle address.
        oracle: Address,
        /// Assigned indices.
        indices: [u8; INDICES_PER_ORACLE],
    },
    /// Oracles holding `index` should report on this flight.
    StatusRequested {
        /// Shard index of the request.
        index: u8,
        /// Operating airline.
        airline: Address,
        /// Flight designator.
        code: String,
        /// Departure time.
        timestamp: i64,
    },
    /// An oracle response was recorded.
    OracleReported {
        /// Shard index of the request.
        index: u8,
        /// Operating airline.
        airline: Address,
        /// Flight designator.
        code: String,
        /// Departure time.
        timestamp: i64,
        /// Reported status.
        status: StatusCode,
    },
    /// Quorum reached; the flight status is now immutable.
    StatusFinalized {
        /// Flight key.
        key: FlightKey,
        /// Final status.
        status: StatusCode,
    },
    /// Passenger bought or topped up a policy.
    PolicyBought {
        /// Passenger address.
        passenger: Address,
        /// Insured flight.
        key: FlightKey,
        /// Amount paid by this purchase.
        amount: Balance,
        /// Total paid into the policy.
        total: Balance,
    },
    /// Passenger credit moved into the withdrawable balance.
    CreditWithdrawn {
        /// Passenger address.
        passenger: Address,
        /// Amount moved.
        amount: Balance,
    },
    /// Operating switch changed.
    OperatingStatusChanged {
        /// New mode.
        operational: bool,
    },
}

/// Sequenced log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log, starting at zero.
    pub seq: u64,
    /// Recorded event.
    pub event: SuretyEvent,
}

/// Append-only event log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` and returns its sequence number.
    pub fn emit(&mut self, event: SuretyEvent) -> u64 {
        let seq = self.records.len() as u64;
        self.records.push(EventRecord { seq, event });
        seq
    }

    /// Records with `seq >= cursor`.
    pub fn since(&self, cursor: u64) -> &[EventRecord] {
        let start = usize::try_from(cursor)
            .unwrap_or(usize::MAX)
            .min(self.records.len());
        &self.records[start..]
    }

    /// Every record in order.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Sequence number the next event will receive.
    pub fn next_seq(&self) -> u64 {
        self.records.len() as u64
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends records from `cursor` onwards to `path` as newline-delimited JSON.
    pub fn write_jsonl(&self, path: &Path, cursor: u64) -> Result<usize> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        let pending = self.since(cursor);
        for record in pending {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(pending.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn sample(n: u8) -> SuretyEvent {
        SuretyEvent::OracleRegistered {
            oracle: Address::from_label(&format!("oracle-{n}")),
            indices: [n, n + 1, n + 2],
        }
    }

    #[test]
    fn sequence_numbers_are_dense() {
        let mut log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.emit(sample(0)), 0);
        assert_eq!(log.emit(sample(1)), 1);
        assert_eq!(log.next_seq(), 2);
        assert_eq!(log.since(1).len(), 1);
        assert_eq!(log.since(1)[0].seq, 1);
        assert!(log.since(99).is_empty());
    }

    #[test]
    fn jsonl_export_appends_pending_records() {
        let mut log = EventLog::new();
        log.emit(sample(0));
        log.emit(SuretyEvent::OperatingStatusChanged { operational: false });
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("surety_events_{nanos}.jsonl"));
        assert_eq!(log.write_jsonl(&path, 0).unwrap(), 2);
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let decoded: EventRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(decoded, log.records()[1]);
        assert!(lines[1].contains("\"type\":\"OperatingStatusChanged\""));
        std::fs::remove_file(path).unwrap();
    }
}
