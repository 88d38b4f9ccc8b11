//! CounterSource — emits a range of integers, then finishes.

use crate::error::Result;
use crate::pipeline::error::{ProcessError, ProcessResult};
use crate::pipeline::options::{int_in_range, ConfigValue, OptionTable, WriteProtection};
use crate::pipeline::process::{Process, ProcessContext};
use crate::pipeline::socket::SocketDescriptor;
use std::time::Duration;

static SOCKETS: &[SocketDescriptor] = &[SocketDescriptor::output("out")];

#[derive(Debug, Clone)]
struct CounterSettings {
    start: i64,
    end: i64,
    /// Pause between emissions.
    interval_ms: i64,
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self {
            start: 1,
            end: 5,
            interval_ms: 0,
        }
    }
}

fn options() -> OptionTable<CounterSettings> {
    OptionTable::<CounterSettings>::new()
        .with(
            "start",
            WriteProtection::WhenStopped,
            |s| ConfigValue::Int(s.start),
            |s, v| {
                s.start = int_in_range(v, i64::MIN, i64::MAX)?;
                Ok(())
            },
        )
        .with(
            "end",
            WriteProtection::WhenStopped,
            |s| ConfigValue::Int(s.end),
            |s, v| {
                s.end = int_in_range(v, i64::MIN, i64::MAX)?;
                Ok(())
            },
        )
        .with(
            "interval_ms",
            WriteProtection::Always,
            |s| ConfigValue::Int(s.interval_ms),
            |s, v| {
                s.interval_ms = int_in_range(v, 0, 60_000)?;
                Ok(())
            },
        )
}

/// Source with no inputs and one output. Emits `start..=end` as `i64`
/// payloads, one per round, then raises Finished.
pub struct CounterSource {
    settings: CounterSettings,
    options: OptionTable<CounterSettings>,
    next: Option<i64>,
    /// Set once `i64::MAX` has been emitted.
    exhausted: bool,
}

impl CounterSource {
    pub fn new() -> Self {
        Self {
            settings: CounterSettings::default(),
            options: options(),
            next: None,
            exhausted: false,
        }
    }

    pub fn with_range(start: i64, end: i64) -> Self {
        let mut source = Self::new();
        source.settings.start = start;
        source.settings.end = end;
        source
    }

    /// Next value to be emitted, once checked.
    pub fn next_value(&self) -> Option<i64> {
        self.next
    }
}

impl Default for CounterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for CounterSource {
    fn name(&self) -> &str {
        "counter_source"
    }

    fn sockets(&self) -> &[SocketDescriptor] {
        SOCKETS
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> ProcessResult {
        let next = self.next.unwrap_or(self.settings.start);
        if self.exhausted || next > self.settings.end {
            return Err(ProcessError::Finished);
        }
        ctx.emit_payload(0, next)?;
        match next.checked_add(1) {
            Some(following) => self.next = Some(following),
            // `end == i64::MAX`: nothing follows
            None => self.exhausted = true,
        }

        if self.settings.interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.settings.interval_ms as u64));
        }
        Ok(())
    }

    fn check(&mut self, reset: bool) -> std::result::Result<(), String> {
        if reset || self.next.is_none() {
            self.next = Some(self.settings.start);
            self.exhausted = false;
        }
        Ok(())
    }

    fn option_policy(&self, name: &str) -> Option<WriteProtection> {
        self.options.policy(name)
    }

    fn option(&self, name: &str) -> Option<ConfigValue> {
        self.options.get(&self.settings, name)
    }

    fn set_option(&mut self, name: &str, value: &ConfigValue) -> Result<()> {
        self.options.set(&mut self.settings, name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::GroupId;
    use crate::pipeline::socket::{connect, InputSocket, OutputSocket};
    use std::sync::Arc;

    #[test]
    fn test_emits_range_then_finishes() {
        let mut source = CounterSource::with_range(3, 4);
        source.check(true).unwrap();
        let outputs = vec![OutputSocket::new("out")];
        let probe = InputSocket::with_capacity("probe", 8);
        connect(&outputs[0], &probe).unwrap();
        let inputs: Vec<Arc<InputSocket>> = Vec::new();
        let mut ctx = ProcessContext::new("counter", &inputs, &outputs, GroupId::DEFAULT);

        source.process(&mut ctx).unwrap();
        source.process(&mut ctx).unwrap();
        assert!(matches!(
            source.process(&mut ctx),
            Err(ProcessError::Finished)
        ));
        assert_eq!(probe.peek(0).unwrap().downcast_ref::<i64>(), Some(&3));
        assert_eq!(probe.peek(1).unwrap().downcast_ref::<i64>(), Some(&4));
        assert_eq!(probe.pending(), 2);
    }

    #[test]
    fn test_range_ending_at_i64_max_finishes() {
        let mut source = CounterSource::with_range(i64::MAX - 1, i64::MAX);
        source.check(true).unwrap();
        let outputs = vec![OutputSocket::new("out")];
        let sink = InputSocket::with_capacity("sink", 8);
        connect(&outputs[0], &sink).unwrap();
        let inputs: Vec<Arc<InputSocket>> = Vec::new();
        let mut ctx = ProcessContext::new("counter", &inputs, &outputs, GroupId::DEFAULT);

        source.process(&mut ctx).unwrap();
        source.process(&mut ctx).unwrap();
        assert!(matches!(
            source.process(&mut ctx),
            Err(ProcessError::Finished)
        ));
        assert_eq!(sink.pending(), 2);
        assert_eq!(
            sink.peek(1).unwrap().downcast_ref::<i64>(),
            Some(&i64::MAX)
        );

        source.check(true).unwrap();
        assert_eq!(source.next_value(), Some(i64::MAX - 1));
    }

    #[test]
    fn test_check_without_reset_keeps_position() {
        let mut source = CounterSource::with_range(1, 10);
        source.check(true).unwrap();
        source.next = Some(4);
        source.check(false).unwrap();
        assert_eq!(source.next_value(), Some(4));
        source.check(true).unwrap();
        assert_eq!(source.next_value(), Some(1));
    }

    #[test]
    fn test_options() {
        let mut source = CounterSource::new();
        source.set_option("end", &ConfigValue::Int(20)).unwrap();
        assert_eq!(source.option("end"), Some(ConfigValue::Int(20)));
        assert!(source
            .set_option("interval_ms", &ConfigValue::Int(-1))
            .is_err());
        assert_eq!(source.option_policy("interval_ms"), Some(WriteProtection::Always));
        assert_eq!(source.option_policy("nope"), None);
    }
}
