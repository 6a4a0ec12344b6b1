use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl SyncRunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncRunStatus::Started => "started",
            SyncRunStatus::Completed => "completed",
            SyncRunStatus::Failed => "failed",
            SyncRunStatus::Cancelled => "cancelled",
        }
    }

    /// A run is finalized exactly once; terminal statuses never change.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, SyncRunStatus::Started)
    }
}

impl std::fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(SyncRunStatus::Started),
            "completed" => Ok(SyncRunStatus::Completed),
            "failed" => Ok(SyncRunStatus::Failed),
            "cancelled" => Ok(SyncRunStatus::Cancelled),
            other => Err(format!("unknown sync run status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Manual,
    Scheduled,
}

impl SyncKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncKind::Manual => "manual",
            SyncKind::Scheduled => "scheduled",
        }
    }
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SyncKind::Manual),
            "scheduled" => Ok(SyncKind::Scheduled),
            other => Err(format!("unknown sync kind '{other}'")),
        }
    }
}

/// Where a sync run currently is in the pipeline.
///
/// Persisted on the run as human-readable text so a polling admin view can
/// show it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum SyncStage {
    Idle,
    Fetching { chunk: usize },
    Parsing,
    Upserting { batch: usize, total_batches: usize },
    Linking,
    Reconciling,
    Completed,
    Failed,
    Cancelled,
}

impl SyncStage {
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            SyncStage::Idle => "idle".to_string(),
            SyncStage::Fetching { chunk } => format!("fetching feed chunk {}", chunk + 1),
            SyncStage::Parsing => "parsing feed".to_string(),
            SyncStage::Upserting {
                batch,
                total_batches,
            } => format!("upserting batch {batch} of {total_batches}"),
            SyncStage::Linking => "linking variants".to_string(),
            SyncStage::Reconciling => "deactivating missing products".to_string(),
            SyncStage::Completed => "completed".to_string(),
            SyncStage::Failed => "failed".to_string(),
            SyncStage::Cancelled => "cancelled".to_string(),
        }
    }
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_started_is_non_terminal() {
        assert!(!SyncRunStatus::Started.is_terminal());
        assert!(SyncRunStatus::Completed.is_terminal());
        assert!(SyncRunStatus::Failed.is_terminal());
        assert!(SyncRunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_parses_its_own_text() {
        for status in [
            SyncRunStatus::Started,
            SyncRunStatus::Completed,
            SyncRunStatus::Failed,
            SyncRunStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SyncRunStatus>().unwrap(), status);
        }
        assert!("running".parse::<SyncRunStatus>().is_err());
    }

    #[test]
    fn upserting_label_is_one_based_text() {
        let stage = SyncStage::Upserting {
            batch: 3,
            total_batches: 10,
        };
        assert_eq!(stage.label(), "upserting batch 3 of 10");
        assert_eq!(
            SyncStage::Fetching { chunk: 0 }.label(),
            "fetching feed chunk 1"
        );
    }
}
