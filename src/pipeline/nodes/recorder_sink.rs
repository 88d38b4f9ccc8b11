//! RecorderSink — records every round and structural event it observes.
//!
//! Inputs are declared at construction time, each with its own group, so the
//! recorder can sit behind any mix of synchronized branches. The shared
//! [`Recording`] is meant for inspection from another thread.

use crate::error::Result;
use crate::pipeline::error::{ProcessError, ProcessResult};
use crate::pipeline::id::GroupId;
use crate::pipeline::options::{int_in_range, ConfigValue, OptionTable, WriteProtection};
use crate::pipeline::process::{GroupRelation, Process, ProcessContext, SyncEventKind};
use crate::pipeline::socket::SocketDescriptor;
use crate::pipeline::sync::lock;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEntry {
    /// One processed round: the active group and the integer read from each
    /// of its inputs, in declaration order.
    Round { group: GroupId, values: Vec<i64> },
    Sync { kind: SyncEventKind, group: GroupId },
    Stopped,
    Paused,
    Resumed,
}

#[derive(Debug, Clone, Default)]
pub struct Recording {
    entries: Arc<Mutex<Vec<RecordEntry>>>,
}

impl Recording {
    pub fn entries(&self) -> Vec<RecordEntry> {
        lock(&self.entries).clone()
    }

    /// Values of every round of `group`, flattened.
    pub fn values_of(&self, group: GroupId) -> Vec<i64> {
        lock(&self.entries)
            .iter()
            .filter_map(|e| match e {
                RecordEntry::Round { group: g, values } if *g == group => Some(values.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&RecordEntry) -> bool) -> usize {
        lock(&self.entries).iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    fn push(&self, entry: RecordEntry) {
        lock(&self.entries).push(entry);
    }
}

#[derive(Debug, Clone, Default)]
struct RecorderSettings {
    /// Fail the round when this value is seen. Used to inject faults.
    fail_on: Option<i64>,
}

fn options() -> OptionTable<RecorderSettings> {
    OptionTable::<RecorderSettings>::new().with(
        "fail_on",
        WriteProtection::Always,
        |s| ConfigValue::Int(s.fail_on.unwrap_or(i64::MIN)),
        |s, v| {
            s.fail_on = Some(int_in_range(v, i64::MIN, i64::MAX)?);
            Ok(())
        },
    )
}

pub struct RecorderSink {
    sockets: Vec<SocketDescriptor>,
    relations: Vec<GroupRelation>,
    recording: Recording,
    settings: RecorderSettings,
    options: OptionTable<RecorderSettings>,
}

impl RecorderSink {
    /// One input named `in` in group 0.
    pub fn new() -> Self {
        Self::with_inputs(&[("in", 0)])
    }

    /// Inputs as `(name, group)` pairs.
    pub fn with_inputs(inputs: &[(&str, i32)]) -> Self {
        let sockets = inputs
            .iter()
            .map(|(name, group)| SocketDescriptor::named_input(*name).in_group(*group))
            .collect();
        Self {
            sockets,
            relations: Vec::new(),
            recording: Recording::default(),
            settings: RecorderSettings::default(),
            options: options(),
        }
    }

    pub fn with_relation(mut self, relation: GroupRelation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn recording(&self) -> Recording {
        self.recording.clone()
    }
}

impl Default for RecorderSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for RecorderSink {
    fn name(&self) -> &str {
        "recorder_sink"
    }

    fn sockets(&self) -> &[SocketDescriptor] {
        &self.sockets
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> ProcessResult {
        let group = ctx.active_group();
        let mut values = Vec::new();
        for index in ctx.inputs_in_group(group) {
            let value = ctx.input_as::<i64>(index).ok_or_else(|| {
                ProcessError::failed(format!("recorder input {} holds no i64 payload", index))
            })?;
            if self.settings.fail_on == Some(value) {
                return Err(ProcessError::failed(format!("refusing value {}", value)));
            }
            values.push(value);
        }
        self.recording.push(RecordEntry::Round { group, values });
        Ok(())
    }

    fn on_sync_event(&mut self, kind: SyncEventKind, group: GroupId) {
        self.recording.push(RecordEntry::Sync { kind, group });
    }

    fn on_stopped(&mut self, _ctx: &mut ProcessContext<'_>) {
        self.recording.push(RecordEntry::Stopped);
    }

    fn on_paused(&mut self, _ctx: &mut ProcessContext<'_>) {
        self.recording.push(RecordEntry::Paused);
    }

    fn on_resumed(&mut self, _ctx: &mut ProcessContext<'_>) {
        self.recording.push(RecordEntry::Resumed);
    }

    fn check(&mut self, reset: bool) -> std::result::Result<(), String> {
        if self.sockets.is_empty() {
            return Err("recorder_sink needs at least one input".to_string());
        }
        if reset {
            self.recording.clear();
        }
        Ok(())
    }

    fn group_relations(&self) -> Vec<GroupRelation> {
        self.relations.clone()
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
