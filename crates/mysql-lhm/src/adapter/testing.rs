//! Scripted adapter double for unit tests.
//!
//! Records every statement the engine issues and replays queued query
//! results in order. Failures are injected by substring match against the
//! statement text, optionally limited to the first N matching calls so
//! retry paths can be exercised.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::adapter::Adapter;
use crate::error::{LhmError, Result};

struct Failure {
    pattern: String,
    code: Option<u16>,
    skip: usize,
    remaining: usize,
}

#[derive(Default)]
pub(crate) struct MockAdapter {
    statements: Mutex<Vec<String>>,
    i64_results: Mutex<VecDeque<Option<i64>>>,
    pair_results: Mutex<VecDeque<Option<(Option<i64>, Option<i64>)>>>,
    string_results: Mutex<VecDeque<Option<String>>>,
    string_pair_results: Mutex<VecDeque<Vec<(String, String)>>>,
    failures: Mutex<Vec<Failure>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement issued so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// Count of issued statements containing `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.executed().iter().filter(|s| s.contains(pattern)).count()
    }

    pub fn queue_i64(&self, value: Option<i64>) {
        self.i64_results.lock().unwrap().push_back(value);
    }

    pub fn queue_pair(&self, value: Option<(Option<i64>, Option<i64>)>) {
        self.pair_results.lock().unwrap().push_back(value);
    }

    pub fn queue_string(&self, value: Option<&str>) {
        self.string_results
            .lock()
            .unwrap()
            .push_back(value.map(String::from));
    }

    pub fn queue_string_pairs(&self, rows: Vec<(&str, &str)>) {
        self.string_pair_results.lock().unwrap().push_back(
            rows.into_iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        );
    }

    /// Fail every statement containing `pattern` with the given server code.
    pub fn fail_matching(&self, pattern: &str, code: Option<u16>) {
        self.fail_matching_times(pattern, code, usize::MAX);
    }

    /// Fail the first `times` statements containing `pattern`.
    pub fn fail_matching_times(&self, pattern: &str, code: Option<u16>, times: usize) {
        self.fail_matching_after(pattern, code, 0, times);
    }

    /// Let the first `skip` statements containing `pattern` through, then
    /// fail the next `times`.
    pub fn fail_matching_after(&self, pattern: &str, code: Option<u16>, skip: usize, times: usize) {
        self.failures.lock().unwrap().push(Failure {
            pattern: pattern.to_string(),
            code,
            skip,
            remaining: times,
        });
    }

    fn record(&self, sql: &str) -> Result<()> {
        self.statements.lock().unwrap().push(sql.to_string());

        let mut failures = self.failures.lock().unwrap();
        for failure in failures.iter_mut() {
            if sql.contains(&failure.pattern) {
                if failure.skip > 0 {
                    failure.skip -= 1;
                    continue;
                }
                if failure.remaining == 0 {
                    continue;
                }
                if failure.remaining != usize::MAX {
                    failure.remaining -= 1;
                }
                return Err(LhmError::db(
                    format!("injected failure for {:?}", failure.pattern),
                    failure.code,
                ));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn execute(&self, sql: &str) -> Result<u64> {
        self.record(sql)?;
        Ok(0)
    }

    async fn query_i64(&self, sql: &str) -> Result<Option<i64>> {
        self.record(sql)?;
        Ok(self.i64_results.lock().unwrap().pop_front().flatten())
    }

    async fn query_i64_pair(&self, sql: &str) -> Result<Option<(Option<i64>, Option<i64>)>> {
        self.record(sql)?;
        Ok(self.pair_results.lock().unwrap().pop_front().flatten())
    }

    async fn query_string(&self, sql: &str) -> Result<Option<String>> {
        self.record(sql)?;
        Ok(self.string_results.lock().unwrap().pop_front().flatten())
    }

    async fn query_string_pairs(&self, sql: &str) -> Result<Vec<(String, String)>> {
        self.record(sql)?;
        Ok(self
            .string_pair_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}
