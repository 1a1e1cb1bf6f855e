use crate::core::io::Storage;
use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MONTHLY_LIMIT: u64 = 10_000;

const RECENT_REQUEST_CAP: usize = 100;
const PREVIEW_CHARS: usize = 50;
/// Roughly how many characters of text one minute of speech covers.
const CHARS_PER_MINUTE: u64 = 600;

const WARN_PERCENT: f64 = 75.0;
const CRITICAL_PERCENT: f64 = 90.0;

/// Source of the current quota window key and request timestamps.
pub trait PeriodClock: Send + Sync {
    fn period_key(&self) -> String;
    fn timestamp(&self) -> String;
}

pub struct SystemClock;

impl PeriodClock for SystemClock {
    fn period_key(&self) -> String {
        Local::now().format("%Y-%m").to_string()
    }

    fn timestamp(&self) -> String {
        Local::now().to_rfc3339()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageRequest {
    pub timestamp: String,
    pub characters: u64,
    pub text_preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub period_key: String,
    pub characters_used: u64,
    pub limit: u64,
    #[serde(default)]
    pub recent_requests: Vec<UsageRequest>,
}

impl UsageRecord {
    fn fresh(period_key: String, limit: u64) -> Self {
        Self {
            period_key,
            characters_used: 0,
            limit,
            recent_requests: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageStats {
    pub period: String,
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub percent_used: f64,
    pub estimated_minutes_remaining: u64,
    pub exhausted: bool,
}

/// Monthly character budget for the metered speech provider.
pub struct UsageLedger {
    record: UsageRecord,
    clock: Box<dyn PeriodClock>,
}

impl UsageLedger {
    pub fn new(limit: u64, clock: Box<dyn PeriodClock>) -> Self {
        let record = UsageRecord::fresh(clock.period_key(), limit);
        Self { record, clock }
    }

    pub fn from_record(record: UsageRecord, clock: Box<dyn PeriodClock>) -> Self {
        Self { record, clock }
    }

    /// Loads the ledger file, falling back to a fresh record when it is missing or
    /// unreadable. The configured limit replaces whatever limit was stored.
    pub async fn load(
        storage: &dyn Storage,
        path: &str,
        limit: u64,
        clock: Box<dyn PeriodClock>,
    ) -> Result<Self> {
        if !storage.exists(path).await? {
            return Ok(Self::new(limit, clock));
        }

        let content = storage.read_to_string(path).await?;
        match serde_json::from_str::<UsageRecord>(&content) {
            Ok(mut record) => {
                record.limit = limit;
                Ok(Self::from_record(record, clock))
            }
            Err(e) => {
                warn!("Usage file {} is corrupt ({}), starting a new period", path, e);
                Ok(Self::new(limit, clock))
            }
        }
    }

    pub async fn save(&self, storage: &dyn Storage, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.record)?;
        storage
            .write(path, json.as_bytes())
            .await
            .context("Failed to persist usage ledger")
    }

    pub fn record(&self) -> &UsageRecord {
        &self.record
    }

    fn roll_period(&mut self) {
        let current = self.clock.period_key();
        if self.record.period_key != current {
            debug!(
                "Usage period rolled over from {} to {}",
                self.record.period_key, current
            );
            self.record = UsageRecord::fresh(current, self.record.limit);
        }
    }

    pub fn has_budget(&mut self, characters: u64) -> bool {
        self.roll_period();
        self.record.characters_used.saturating_add(characters) <= self.record.limit
    }

    /// Counts a completed request and logs it.
    pub fn record_usage(&mut self, characters: u64, text: &str) {
        self.roll_period();
        self.record.characters_used = self.record.characters_used.saturating_add(characters);
        self.log_request(characters, text);
    }

    /// Holds `characters` of budget for a request in flight. Returns false,
    /// holding nothing, when the request would exceed the budget. Follow with
    /// [`commit`](Self::commit) on success or [`refund`](Self::refund) on failure.
    pub fn try_reserve(&mut self, characters: u64) -> bool {
        if !self.has_budget(characters) {
            return false;
        }
        self.record.characters_used = self.record.characters_used.saturating_add(characters);
        true
    }

    /// Logs a reserved request once the provider has delivered it.
    pub fn commit(&mut self, characters: u64, text: &str) {
        self.log_request(characters, text);
    }

    /// Releases a reservation whose request failed.
    pub fn refund(&mut self, characters: u64) {
        self.roll_period();
        self.record.characters_used = self.record.characters_used.saturating_sub(characters);
    }

    fn log_request(&mut self, characters: u64, text: &str) {
        self.record.recent_requests.push(UsageRequest {
            timestamp: self.clock.timestamp(),
            characters,
            text_preview: text.chars().take(PREVIEW_CHARS).collect(),
        });
        let overflow = self
            .record
            .recent_requests
            .len()
            .saturating_sub(RECENT_REQUEST_CAP);
        if overflow > 0 {
            self.record.recent_requests.drain(..overflow);
        }

        let after = self.percent_used();
        let before = self.percent_of(self.record.characters_used.saturating_sub(characters));
        if before < CRITICAL_PERCENT && after >= CRITICAL_PERCENT {
            warn!(
                "Speech quota at {:.1}% ({} of {} characters used this month)",
                after, self.record.characters_used, self.record.limit
            );
        } else if before < WARN_PERCENT && after >= WARN_PERCENT {
            warn!(
                "Speech quota passed {:.0}% ({} of {} characters)",
                WARN_PERCENT, self.record.characters_used, self.record.limit
            );
        }
    }

    fn percent_used(&self) -> f64 {
        self.percent_of(self.record.characters_used)
    }

    fn percent_of(&self, used: u64) -> f64 {
        if self.record.limit == 0 {
            return 100.0;
        }
        used as f64 / self.record.limit as f64 * 100.0
    }

    pub fn current_stats(&mut self) -> UsageStats {
        self.roll_period();
        let used = self.record.characters_used;
        let limit = self.record.limit;
        let remaining = limit.saturating_sub(used);
        UsageStats {
            period: self.record.period_key.clone(),
            used,
            limit,
            remaining,
            percent_used: (self.percent_used() * 10.0).round() / 10.0,
            estimated_minutes_remaining: remaining / CHARS_PER_MINUTE,
            exhausted: used >= limit,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::io::NativeStorage;

    pub(crate) struct FixedClock(pub &'static str);

    impl PeriodClock for FixedClock {
        fn period_key(&self) -> String {
            self.0.to_string()
        }

        fn timestamp(&self) -> String {
            format!("{}-01T00:00:00+00:00", self.0)
        }
    }

    fn may_2024_record() -> UsageRecord {
        UsageRecord {
            period_key: "2024-05".to_string(),
            characters_used: 9000,
            limit: 10_000,
            recent_requests: vec![UsageRequest {
                timestamp: "2024-05-30T10:00:00+00:00".to_string(),
                characters: 9000,
                text_preview: "old".to_string(),
            }],
        }
    }

    #[test]
    fn test_rollover_resets_before_budget_check() {
        let mut ledger =
            UsageLedger::from_record(may_2024_record(), Box::new(FixedClock("2024-06")));
        assert!(ledger.has_budget(500));
        let stats = ledger.current_stats();
        assert_eq!(stats.used, 0);
        assert_eq!(stats.period, "2024-06");
        assert!(ledger.record().recent_requests.is_empty());
    }

    #[test]
    fn test_same_period_keeps_counter() {
        let mut ledger =
            UsageLedger::from_record(may_2024_record(), Box::new(FixedClock("2024-05")));
        assert!(ledger.has_budget(1000));
        assert!(!ledger.has_budget(1001));
        assert_eq!(ledger.current_stats().used, 9000);
    }

    #[test]
    fn test_exhausted_until_rollover() {
        let mut ledger = UsageLedger::new(100, Box::new(FixedClock("2024-01")));
        ledger.record_usage(100, "x");
        let stats = ledger.current_stats();
        assert!(stats.exhausted);
        assert_eq!(stats.remaining, 0);
        assert!(!ledger.has_budget(1));

        let mut ledger =
            UsageLedger::from_record(ledger.record().clone(), Box::new(FixedClock("2024-02")));
        assert!(ledger.has_budget(1));
    }

    #[test]
    fn test_stats_and_recent_log_bounds() {
        let mut ledger = UsageLedger::new(10_000, Box::new(FixedClock("2024-03")));
        let long_text = "a".repeat(80);
        for _ in 0..105 {
            ledger.record_usage(12, &long_text);
        }
        let record = ledger.record();
        assert_eq!(record.recent_requests.len(), 100);
        assert_eq!(record.recent_requests[0].text_preview.chars().count(), 50);

        let stats = ledger.current_stats();
        assert_eq!(stats.used, 1260);
        assert_eq!(stats.remaining, 8740);
        assert_eq!(stats.percent_used, 12.6);
        assert_eq!(stats.estimated_minutes_remaining, 14);
    }

    #[test]
    fn test_reserve_and_refund() {
        let mut ledger = UsageLedger::new(1000, Box::new(FixedClock("2024-03")));
        assert!(ledger.try_reserve(600));
        assert!(!ledger.try_reserve(600));
        assert_eq!(ledger.current_stats().used, 600);
        ledger.refund(600);
        assert!(ledger.try_reserve(600));
        ledger.commit(600, "second");
        assert_eq!(ledger.record().recent_requests.len(), 1);
        assert_eq!(ledger.record().recent_requests[0].text_preview, "second");
    }

    #[test]
    fn test_refunded_request_leaves_no_log_entry() {
        let mut ledger = UsageLedger::new(1000, Box::new(FixedClock("2024-03")));
        assert!(ledger.try_reserve(800));
        ledger.refund(800);
        assert_eq!(ledger.record().characters_used, 0);
        assert!(ledger.record().recent_requests.is_empty());
    }

    #[tokio::test]
    async fn test_load_save_roundtrip_applies_configured_limit() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("data").join("tts-usage.json");
        let path = path.to_str().unwrap();
        let storage = NativeStorage::new();

        let missing = UsageLedger::load(&storage, path, 5000, Box::new(FixedClock("2024-05"))).await?;
        assert_eq!(missing.record().characters_used, 0);

        let ledger = UsageLedger::from_record(may_2024_record(), Box::new(FixedClock("2024-05")));
        ledger.save(&storage, path).await?;

        let mut loaded =
            UsageLedger::load(&storage, path, 20_000, Box::new(FixedClock("2024-05"))).await?;
        let stats = loaded.current_stats();
        assert_eq!(stats.used, 9000);
        assert_eq!(stats.limit, 20_000);

        let saved = storage.read_to_string(path).await?;
        assert!(saved.contains("\"periodKey\": \"2024-05\""));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_fresh() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("usage.json");
        let path = path.to_str().unwrap();
        let storage = NativeStorage::new();
        storage.write(path, b"{not json").await?;

        let mut ledger = UsageLedger::load(&storage, path, 10_000, Box::new(FixedClock("2024-05"))).await?;
        assert_eq!(ledger.current_stats().used, 0);
        Ok(())
    }
}
