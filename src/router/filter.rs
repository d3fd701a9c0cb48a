//! Filter engine: a publisher's `filters` list is a chain of named rules,
//! each either admitting or rejecting an envelope; the first matching rule
//! decides. An empty chain admits everything.
use std::time::{Duration, Instant};

use crate::config::{FilterAction, FilterConfig, FilterKind};
use crate::core::PgnValue;
use crate::error::ConfigError;
use crate::infra::codec::traits::FieldAccess;
use crate::protocol::messages::Envelope;

/// One resolved, ready-to-evaluate filter. Time filters carry their own
/// mutable per-(pgn, source) last-seen table, so they live behind a mutex
/// inside [`FilterSet`] rather than as a plain `Vec<Rule>`.
enum Rule {
    Sentence0183 {
        action: FilterAction,
        talkers: Vec<String>,
        formatters: Vec<String>,
    },
    Pgn2000 {
        action: FilterAction,
        source_addresses: Vec<u8>,
        pgns: Vec<u32>,
        manufacturer_ids: Vec<u16>,
    },
    Time { period: Duration },
}

impl Rule {
    fn from_config(config: &FilterConfig) -> Self {
        match config.kind {
            FilterKind::Sentence0183 => Rule::Sentence0183 {
                action: config.action,
                talkers: config.talkers.clone(),
                formatters: config.formatters.clone(),
            },
            FilterKind::Pgn2000 => Rule::Pgn2000 {
                action: config.action,
                source_addresses: config.source_addresses.clone(),
                pgns: config.pgns.clone(),
                manufacturer_ids: config.manufacturer_ids.clone(),
            },
            FilterKind::Time => Rule::Time {
                period: Duration::from_millis(config.period_ms.unwrap_or(0)),
            },
        }
    }

    /// `None` means the rule does not apply to this envelope at all (wrong
    /// kind); `Some(bool)` is the admit/reject verdict when it does.
    fn evaluate(&self, envelope: &Envelope, last_seen: &mut Vec<((u32, u8), Instant)>) -> Option<bool> {
        match self {
            Rule::Sentence0183 { action, talkers, formatters } => match envelope {
                Envelope::Sentence0183 { talker, sentence } => {
                    let formatter = sentence.get(3..6).unwrap_or("");
                    let talker_matches = talkers.is_empty() || talkers.iter().any(|t| t == talker);
                    let formatter_matches = formatters.is_empty() || formatters.iter().any(|f| f == formatter);
                    let matched = talker_matches && formatter_matches;
                    Some(apply_action(*action, matched))
                }
                _ => None,
            },
            Rule::Pgn2000 { action, source_addresses, pgns, manufacturer_ids } => match envelope {
                Envelope::Decoded2000 { pgn, source, fields, .. } => {
                    let source_matches = source_addresses.is_empty() || source_addresses.contains(source);
                    let pgn_matches = pgns.is_empty() || pgns.contains(pgn);
                    let manufacturer_matches = manufacturer_ids.is_empty()
                        || matches!(
                            fields.field("ManufacturerCode"),
                            Some(PgnValue::U16(code)) if manufacturer_ids.contains(&code)
                        );
                    let matched = source_matches && pgn_matches && manufacturer_matches;
                    Some(apply_action(*action, matched))
                }
                Envelope::Raw2000 { pgn, source, .. } => {
                    let source_matches = source_addresses.is_empty() || source_addresses.contains(source);
                    let pgn_matches = pgns.is_empty() || pgns.contains(pgn);
                    Some(apply_action(*action, source_matches && pgn_matches))
                }
                _ => None,
            },
            Rule::Time { period } => {
                let (pgn, source) = match envelope {
                    Envelope::Decoded2000 { pgn, source, .. } | Envelope::Raw2000 { pgn, source, .. } => {
                        (*pgn, *source)
                    }
                    Envelope::Sentence0183 { .. } => return None,
                };
                let key = (pgn, source);
                let now = Instant::now();
                if let Some(entry) = last_seen.iter_mut().find(|(k, _)| *k == key) {
                    if now.duration_since(entry.1) < *period {
                        return Some(false);
                    }
                    entry.1 = now;
                } else {
                    last_seen.push((key, now));
                }
                Some(true)
            }
        }
    }
}

fn apply_action(action: FilterAction, matched: bool) -> bool {
    match action {
        FilterAction::Select => matched,
        FilterAction::Discard => !matched,
    }
}

/// Ordered chain of filters attached to one publisher.
pub struct FilterSet {
    rules: Vec<Rule>,
    time_state: std::sync::Mutex<Vec<((u32, u8), Instant)>>,
}

impl FilterSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new(), time_state: std::sync::Mutex::new(Vec::new()) }
    }

    /// Resolves a publisher's `filters: Vec<String>` against the top-level
    /// `filters` configuration section, in the order they were named.
    pub fn from_names(names: &[String], available: &[FilterConfig]) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(names.len());
        for name in names {
            let config = available
                .iter()
                .find(|f| &f.name == name)
                .ok_or_else(|| ConfigError::UnknownEndpoint {
                    name: name.clone(),
                    filter: name.clone(),
                })?;
            rules.push(Rule::from_config(config));
        }
        Ok(Self { rules, time_state: std::sync::Mutex::new(Vec::new()) })
    }

    /// First matching rule decides; an envelope no rule applies to is admitted.
    pub fn admits(&self, envelope: &Envelope) -> bool {
        let mut last_seen = self.time_state.lock().expect("filter time state poisoned");
        for rule in &self.rules {
            if let Some(verdict) = rule.evaluate(envelope, &mut last_seen) {
                return verdict;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;

    fn pgn_envelope(pgn: u32, source: u8) -> Envelope {
        Envelope::Raw2000 { pgn, source, destination: None, priority: 2, payload: vec![0; 8] }
    }

    #[test]
    fn select_filter_admits_only_listed_pgns() {
        let config = FilterConfig {
            name: "gps-only".to_string(),
            kind: FilterKind::Pgn2000,
            action: FilterAction::Select,
            talkers: vec![],
            formatters: vec![],
            source_addresses: vec![],
            pgns: vec![129_025],
            manufacturer_ids: vec![],
            period_ms: None,
        };
        let set = FilterSet::from_names(&["gps-only".to_string()], &[config]).unwrap();
        assert!(set.admits(&pgn_envelope(129_025, 10)));
        assert!(!set.admits(&pgn_envelope(130_824, 10)));
    }

    #[test]
    fn discard_filter_rejects_listed_source() {
        let config = FilterConfig {
            name: "no-engine".to_string(),
            kind: FilterKind::Pgn2000,
            action: FilterAction::Discard,
            talkers: vec![],
            formatters: vec![],
            source_addresses: vec![5],
            pgns: vec![],
            manufacturer_ids: vec![],
            period_ms: None,
        };
        let set = FilterSet::from_names(&["no-engine".to_string()], &[config]).unwrap();
        assert!(!set.admits(&pgn_envelope(127_488, 5)));
        assert!(set.admits(&pgn_envelope(127_488, 9)));
    }

    #[test]
    fn time_filter_throttles_repeat_of_same_pgn_and_source() {
        let config = FilterConfig {
            name: "throttle".to_string(),
            kind: FilterKind::Time,
            action: FilterAction::Select,
            talkers: vec![],
            formatters: vec![],
            source_addresses: vec![],
            pgns: vec![],
            manufacturer_ids: vec![],
            period_ms: Some(3_600_000),
        };
        let set = FilterSet::from_names(&["throttle".to_string()], &[config]).unwrap();
        assert!(set.admits(&pgn_envelope(129_025, 10)));
        assert!(!set.admits(&pgn_envelope(129_025, 10)));
        assert!(set.admits(&pgn_envelope(129_025, 11)));
    }

    #[test]
    fn empty_chain_admits_everything() {
        let set = FilterSet::empty();
        assert!(set.admits(&pgn_envelope(129_025, 10)));
    }
}
