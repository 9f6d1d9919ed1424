//! `m.room.power_levels` content helpers.
//!
//! Parsing rules:
//! - Levels are integers in the canonical JSON range. Numeric strings
//!   (`"50"`) are accepted on read, since older room versions allow them;
//!   writes always produce numbers.
//! - Any other shape is `MalformedEvent`, never a silent default.

use serde_json::{Map, Value};

use crate::error::{Result, RoomGuardError};

/// Largest integer allowed in canonical JSON.
pub const MAX_POWER_LEVEL: i64 = 9_007_199_254_740_991;
/// Smallest integer allowed in canonical JSON.
pub const MIN_POWER_LEVEL: i64 = -MAX_POWER_LEVEL;

/// Level a room creator gets by default.
pub const CREATOR_LEVEL: i64 = 100;
/// Threshold used when looking for a room admin.
pub const ADMIN_LEVEL: i64 = 50;

const DEFAULT_EVENTS_DEFAULT: i64 = 0;
const DEFAULT_STATE_DEFAULT: i64 = 50;
const DEFAULT_USERS_DEFAULT: i64 = 0;

const INT_FIELDS: [&str; 8] = [
    "ban",
    "events_default",
    "invite",
    "kick",
    "redact",
    "state_default",
    "users_default",
    "historical",
];

/// Parse a single level value.
pub fn parse_level(v: &Value, what: &str) -> Result<i64> {
    let n = match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match n {
        Some(n) if (MIN_POWER_LEVEL..=MAX_POWER_LEVEL).contains(&n) => Ok(n),
        _ => Err(RoomGuardError::MalformedEvent(format!(
            "power level {what} must be an integer, got {v}"
        ))),
    }
}

/// Read-only view over power-levels content.
#[derive(Debug, Clone, Copy)]
pub struct PowerLevels<'a> {
    content: &'a Map<String, Value>,
}

impl<'a> PowerLevels<'a> {
    pub fn new(content: &'a Map<String, Value>) -> Self {
        Self { content }
    }

    /// Check every field a filter may read. Call before rewriting.
    pub fn validate(&self) -> Result<()> {
        for f in INT_FIELDS {
            if let Some(v) = self.content.get(f) {
                parse_level(v, f)?;
            }
        }
        if let Some(events) = self.events()? {
            for (ty, v) in events {
                parse_level(v, &format!("events.{ty}"))?;
            }
        }
        self.users()?;
        Ok(())
    }

    fn int_or(&self, field: &str, default: i64) -> Result<i64> {
        match self.content.get(field) {
            Some(v) => parse_level(v, field),
            None => Ok(default),
        }
    }

    pub fn events_default(&self) -> Result<i64> {
        self.int_or("events_default", DEFAULT_EVENTS_DEFAULT)
    }

    pub fn state_default(&self) -> Result<i64> {
        self.int_or("state_default", DEFAULT_STATE_DEFAULT)
    }

    pub fn users_default(&self) -> Result<i64> {
        self.int_or("users_default", DEFAULT_USERS_DEFAULT)
    }

    /// The `events` map, if present.
    pub fn events(&self) -> Result<Option<&'a Map<String, Value>>> {
        match self.content.get("events") {
            None => Ok(None),
            Some(Value::Object(m)) => Ok(Some(m)),
            Some(other) => Err(RoomGuardError::MalformedEvent(format!(
                "power levels events must be an object, got {other}"
            ))),
        }
    }

    /// Explicit level for event type `ty`, if the `events` map names it.
    pub fn event_level(&self, ty: &str) -> Result<Option<i64>> {
        match self.events()?.and_then(|m| m.get(ty)) {
            Some(v) => parse_level(v, &format!("events.{ty}")).map(Some),
            None => Ok(None),
        }
    }

    /// Level required to send message event `ty` (explicit or `events_default`).
    pub fn effective_event_level(&self, ty: &str) -> Result<i64> {
        match self.event_level(ty)? {
            Some(l) => Ok(l),
            None => self.events_default(),
        }
    }

    /// `users` entries in document order.
    pub fn users(&self) -> Result<Vec<(&'a str, i64)>> {
        match self.content.get("users") {
            None => Ok(Vec::new()),
            Some(Value::Object(m)) => m
                .iter()
                .map(|(u, v)| parse_level(v, &format!("users.{u}")).map(|l| (u.as_str(), l)))
                .collect(),
            Some(other) => Err(RoomGuardError::MalformedEvent(format!(
                "power levels users must be an object, got {other}"
            ))),
        }
    }

    /// Highest level any member can hold: explicit users, `users_default`, or the creator level.
    pub fn highest_user_level(&self) -> Result<i64> {
        let mut top = self.users_default()?.max(CREATOR_LEVEL);
        for (_, l) in self.users()? {
            top = top.max(l);
        }
        Ok(top)
    }

    /// First user (document order) whose level is at least `level`.
    pub fn first_user_at_least(&self, level: i64) -> Result<Option<&'a str>> {
        Ok(self
            .users()?
            .into_iter()
            .find(|(_, l)| *l >= level)
            .map(|(u, _)| u))
    }
}

/// Mutable view over power-levels content.
#[derive(Debug)]
pub struct PowerLevelsMut<'a> {
    content: &'a mut Map<String, Value>,
}

impl<'a> PowerLevelsMut<'a> {
    pub fn new(content: &'a mut Map<String, Value>) -> Self {
        Self { content }
    }

    pub fn view(&self) -> PowerLevels<'_> {
        PowerLevels::new(self.content)
    }

    /// Set `events[ty] = level`. Returns whether the document changed.
    pub fn set_event_level(&mut self, ty: &str, level: i64) -> Result<bool> {
        let current = self.view().event_level(ty)?;
        let canonical = matches!(
            self.content.get("events").and_then(|m| m.get(ty)),
            Some(Value::Number(_))
        );
        if current == Some(level) && canonical {
            return Ok(false);
        }

        let events = self
            .content
            .entry("events")
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(events) = events else {
            return Err(RoomGuardError::MalformedEvent(
                "power levels events must be an object".into(),
            ));
        };
        events.insert(ty.to_string(), Value::from(level));
        Ok(true)
    }

    /// Lower `events_default` to `level` when it is currently higher.
    /// Returns the previous value when it changed.
    pub fn lower_events_default(&mut self, level: i64) -> Result<Option<i64>> {
        let old = self.view().events_default()?;
        if old <= level {
            return Ok(None);
        }
        self.content
            .insert("events_default".to_string(), Value::from(level));
        Ok(Some(old))
    }
}
