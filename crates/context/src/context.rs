//! `ApiContext`: the per-name state tracked by the context store — a
//! bounded ring of recent calls plus a merged shared-data map.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RecentCall {
    pub method: String,
    pub path: String,
    pub request_body: String,
    pub response_body: String,
    pub at: DateTime<Utc>,
}

pub struct ApiContext {
    pub name: String,
    pub recent_calls: VecDeque<RecentCall>,
    pub recent_calls_limit: usize,
    /// Insertion-ordered so `formatForPrompt` and `snapshot` are stable;
    /// later values for the same path overwrite earlier ones (spec.md
    /// §4.3 "later values overwrite earlier").
    pub shared_data: Vec<(String, String)>,
    pub created_at: Instant,
    pub last_used_at: Instant,
}

impl ApiContext {
    pub fn new(name: impl Into<String>, recent_calls_limit: usize) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            recent_calls: VecDeque::new(),
            recent_calls_limit,
            shared_data: Vec::new(),
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn record_call(&mut self, method: &str, path: &str, request_body: &str, response_body: &str) {
        if self.recent_calls.len() >= self.recent_calls_limit {
            self.recent_calls.pop_front();
        }
        self.recent_calls.push_back(RecentCall {
            method: method.to_string(),
            path: path.to_string(),
            request_body: request_body.to_string(),
            response_body: response_body.to_string(),
            at: Utc::now(),
        });
        self.last_used_at = Instant::now();
    }

    pub fn merge_shared(&mut self, pairs: Vec<(String, String)>) {
        for (key, value) in pairs {
            if let Some(existing) = self.shared_data.iter_mut().find(|(k, _)| *k == key) {
                existing.1 = value;
            } else {
                self.shared_data.push((key, value));
            }
        }
    }

    pub fn is_expired(&self, expiration: std::time::Duration) -> bool {
        self.last_used_at.elapsed() > expiration
    }

    /// A bounded text block for prompt inclusion (spec.md §4.3
    /// `formatForPrompt`). Caps at the most recent 5 calls so the block
    /// doesn't dominate the prompt budget.
    pub fn format_for_prompt(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Context \"{}\":\n", self.name));
        if !self.shared_data.is_empty() {
            out.push_str("Known values: ");
            out.push_str(
                &self
                    .shared_data
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            out.push('\n');
        }
        if !self.recent_calls.is_empty() {
            out.push_str("Recent calls:\n");
            for call in self.recent_calls.iter().rev().take(5) {
                out.push_str(&format!("- {} {} -> {}\n", call.method, call.path, truncate(&call.response_body, 200)));
            }
        }
        out
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}
