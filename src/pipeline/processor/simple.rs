use super::{drain, enter_running, finish, pause};
use crate::pipeline::operation::OperationInner;
use crate::pipeline::sync::lock;

/// Inline execution on the thread that delivered the input.
///
/// An operation without connected inputs has nobody to drive it, so pause and
/// stop act immediately on the caller's thread.
#[derive(Debug, Default)]
pub struct SimpleProcessor;

impl SimpleProcessor {
    pub(crate) fn input_ready(&self, inner: &OperationInner) {
        let mut core = lock(&inner.core);
        drain(inner, &mut core);
    }

    pub(crate) fn start(&self, inner: &OperationInner) {
        let mut core = lock(&inner.core);
        enter_running(inner, &mut core);
        drain(inner, &mut core);
    }

    pub(crate) fn pause(&self, inner: &OperationInner) {
        let mut core = lock(&inner.core);
        if core.flow.is_none() {
            pause(inner, &mut core);
        }
    }

    pub(crate) fn stop(&self, inner: &OperationInner) {
        let mut core = lock(&inner.core);
        if core.flow.is_none() {
            finish(inner, &mut core);
        }
    }
}
