//! One-shot tracer attach.

use crate::{
    code_manipulate::CodeManipulator, error::MemoryError, os::ArchCodeManipulator, ProcessId,
};

/// Attach to `pid` as a debugger-style tracer.
///
/// Some platform configurations refuse protection changes unless the caller is a tracer of the
/// process. This issues a single attach request and returns: it does not wait for the tracee to
/// stop, never detaches and keeps no session. A refusal, for example because a tracer is already
/// present, is logged and returned; callers that only attach opportunistically can ignore it.
pub fn attach(pid: ProcessId) -> Result<(), MemoryError> {
    attach_with::<ArchCodeManipulator>(pid)
}

/// [`attach`] through a custom [`CodeManipulator`].
pub fn attach_with<M: CodeManipulator>(pid: ProcessId) -> Result<(), MemoryError> {
    log::debug!("Attaching to process {}", pid);
    M::attach(pid).map_err(|source| {
        log::warn!("Attach to process {} refused: {}", pid, source);
        MemoryError::Attach { pid, source }
    })
}

#[cfg(test)]
mod tests {
    use super::attach_with;
    use crate::{
        code_manipulate::fake::{take_requests, RecordingManipulator, RefusingManipulator, Request},
        error::MemoryError,
    };

    #[test]
    fn test_attach_issues_single_request() {
        take_requests();
        attach_with::<RecordingManipulator>(4242).unwrap();
        assert_eq!(take_requests(), vec![Request::Attach(4242)]);
    }

    #[test]
    fn test_attach_refusal_is_reported() {
        let err = attach_with::<RefusingManipulator>(1).unwrap_err();
        assert!(matches!(err, MemoryError::Attach { pid: 1, .. }));
    }
}
