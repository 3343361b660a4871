/// ERROR HANDLER
///
/// Central sink for failures surfaced to users. Every logged error keeps its
/// raw text, a user-friendly message chosen by substring match, the calling
/// context and a severity. The log is bounded; the oldest entries go first.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Display;
use tracing::error;

pub const MAX_ERROR_LOGS: usize = 1000;

pub const DEFAULT_USER_MESSAGE: &str =
    "An unexpected error occurred. Please try again or contact support if the problem persists.";

/// Substring (matched case-insensitively) to user-facing message. First match wins.
const USER_FRIENDLY_MESSAGES: &[(&str, &str)] = &[
    ("Agent not found", "The requested agent could not be found. Please try refreshing the page."),
    ("Missing or insufficient permissions", "You don't have permission to perform this action. Please check your wallet connection."),
    ("Invalid wallet address", "Please connect a valid Solana wallet to continue."),
    ("Network error", "Connection issue detected. Please check your internet connection and try again."),
    ("Database error", "We're experiencing technical difficulties. Please try again in a few moments."),
    ("Validation failed", "Please check your input and try again."),
    ("Insufficient DMT", "You don't have enough DMT tokens for this action."),
    ("Agent evolution failed", "Agent evolution could not be completed. Please try again."),
    ("Task delegation failed", "Task delegation could not be completed. Please try again."),
    ("Authentication failed", "Please reconnect your wallet and try again."),
    ("Firebase error", "Data synchronization issue. Please try again."),
    ("Solana transaction failed", "Blockchain transaction failed. Please try again."),
    ("Agent creation failed", "Agent creation could not be completed. Please try again."),
    ("Domain validation failed", "Please select a valid domain for your agent."),
    ("Owner validation failed", "Agent ownership validation failed. Please reconnect your wallet."),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

impl ErrorContext {
    pub fn action(action: impl Into<String>) -> Self {
        ErrorContext {
            action: Some(action.into()),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.wallet_address = Some(wallet.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLog {
    pub id: String,
    pub error: String,
    pub message: String,
    pub context: ErrorContext,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
}

/// Pick the user-facing message for a raw error string
pub fn user_friendly_message(error: &str) -> &'static str {
    let lowered = error.to_lowercase();
    USER_FRIENDLY_MESSAGES
        .iter()
        .find(|(needle, _)| lowered.contains(&needle.to_lowercase()))
        .map(|(_, message)| *message)
        .unwrap_or(DEFAULT_USER_MESSAGE)
}

#[derive(Debug)]
pub struct ErrorHandler {
    logs: Mutex<VecDeque<ErrorLog>>,
    max_logs: usize,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ERROR_LOGS)
    }

    pub fn with_capacity(max_logs: usize) -> Self {
        ErrorHandler {
            logs: Mutex::new(VecDeque::with_capacity(max_logs.min(MAX_ERROR_LOGS))),
            max_logs: max_logs.max(1),
        }
    }

    /// Record an error and return the stored entry
    pub fn log_error(&self, error: &dyn Display, context: ErrorContext, severity: Severity) -> ErrorLog {
        let raw = error.to_string();
        let now = Utc::now();
        let entry = ErrorLog {
            id: format!("error_{}_{}", now.timestamp_millis(), &uuid::Uuid::new_v4().simple().to_string()[..9]),
            message: user_friendly_message(&raw).to_string(),
            error: raw,
            context,
            timestamp: now,
            severity,
        };

        error!(
            id = %entry.id,
            severity = ?entry.severity,
            action = entry.context.action.as_deref().unwrap_or("-"),
            "DecentraMind error: {}",
            entry.error
        );

        let mut logs = self.logs.lock();
        logs.push_back(entry.clone());
        while logs.len() > self.max_logs {
            logs.pop_front();
        }
        entry
    }

    /// Logged errors, optionally filtered by severity, oldest first
    pub fn logs(&self, severity: Option<Severity>) -> Vec<ErrorLog> {
        self.logs
            .lock()
            .iter()
            .filter(|log| severity.map_or(true, |s| log.severity == s))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.logs.lock().clear();
    }

    pub fn stats(&self) -> ErrorStats {
        let mut by_severity: BTreeMap<Severity, usize> = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical]
            .into_iter()
            .map(|s| (s, 0))
            .collect();
        let logs = self.logs.lock();
        for log in logs.iter() {
            *by_severity.entry(log.severity).or_insert(0) += 1;
        }
        ErrorStats {
            total: logs.len(),
            by_severity,
        }
    }

    pub fn handle_agent_error(&self, error: &dyn Display, context: ErrorContext) -> String {
        self.log_error(error, context, Severity::High).message
    }

    pub fn handle_authentication_error(&self, error: &dyn Display, context: ErrorContext) -> String {
        self.log_error(error, context, Severity::Critical).message
    }

    pub fn handle_transaction_error(&self, error: &dyn Display, context: ErrorContext) -> String {
        self.log_error(error, context, Severity::High).message
    }

    pub fn handle_validation_error(&self, error: &dyn Display, context: ErrorContext) -> String {
        self.log_error(error, context, Severity::Medium).message
    }

    pub fn handle_network_error(&self, error: &dyn Display, context: ErrorContext) -> String {
        self.log_error(error, context, Severity::Medium).message
    }
}
