//! Execution artifacts and the per-worker artifact stack.
//!
//! An artifact is a named unit of code (a screen, a service, an entity, a
//! template) that participates in the execution path. Callers push an
//! artifact when they enter a unit of work and pop it when they leave; the
//! concatenated frame names form the current [`ArtifactPath`].

use crate::path::ArtifactPath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The broad category an artifact belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screen,
    Service,
    Entity,
    Template,
    Other,
}

impl ArtifactKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Screen => "screen",
            ArtifactKind::Service => "service",
            ArtifactKind::Entity => "entity",
            ArtifactKind::Template => "template",
            ArtifactKind::Other => "other",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named unit of code contributing one segment to the execution path.
///
/// # Examples
///
/// ```
/// use pathguard::artifact::{ArtifactKind, ExecutionArtifact};
///
/// let screen = ExecutionArtifact::screen("invoice-list");
/// assert_eq!(screen.name(), "invoice-list");
/// assert_eq!(screen.kind(), ArtifactKind::Screen);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionArtifact {
    name: String,
    kind: ArtifactKind,
}

impl ExecutionArtifact {
    pub fn new(name: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn screen(name: impl Into<String>) -> Self {
        Self::new(name, ArtifactKind::Screen)
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::new(name, ArtifactKind::Service)
    }

    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(name, ArtifactKind::Entity)
    }

    pub fn template(name: impl Into<String>) -> Self {
        Self::new(name, ArtifactKind::Template)
    }

    pub fn other(name: impl Into<String>) -> Self {
        Self::new(name, ArtifactKind::Other)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }
}

impl fmt::Display for ExecutionArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.kind)
    }
}

/// The ordered stack of artifacts a worker is currently inside.
///
/// Only `push`, `pop`, and `pop_to` mutate the stack. The engine does not
/// deduplicate frames; a caller that pushes the same artifact twice gets two
/// frames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtifactStack {
    frames: Vec<ExecutionArtifact>,
}

impl ArtifactStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, artifact: ExecutionArtifact) {
        self.frames.push(artifact);
    }

    pub fn pop(&mut self) -> Option<ExecutionArtifact> {
        self.frames.pop()
    }

    /// Pop frames until `artifact` itself has been popped.
    ///
    /// If `artifact` is not on the stack, every frame is popped. Returns the
    /// number of frames removed.
    pub fn pop_to(&mut self, artifact: &ExecutionArtifact) -> usize {
        let mut popped = 0;
        while let Some(frame) = self.frames.pop() {
            popped += 1;
            if frame == *artifact {
                break;
            }
        }
        popped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn frames(&self) -> &[ExecutionArtifact] {
        &self.frames
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// The current execution path: `/` + the `/`-joined frame names.
    #[must_use]
    pub fn path(&self) -> ArtifactPath {
        let mut path = ArtifactPath::root();
        for frame in &self.frames {
            path.push_segment(frame.name());
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_joined_frame_names() {
        let mut stack = ArtifactStack::new();
        stack.push(ExecutionArtifact::screen("module"));
        stack.push(ExecutionArtifact::service("view"));
        assert_eq!(stack.path().to_string(), "/module/view");
        stack.pop();
        assert_eq!(stack.path().to_string(), "/module");
    }

    #[test]
    fn empty_stack_addresses_root() {
        assert_eq!(ArtifactStack::new().path().to_string(), "/");
    }

    #[test]
    fn pop_to_unwinds_through_inner_frames() {
        let outer = ExecutionArtifact::screen("outer");
        let mut stack = ArtifactStack::new();
        stack.push(outer.clone());
        stack.push(ExecutionArtifact::service("mid"));
        stack.push(ExecutionArtifact::template("inner"));
        assert_eq!(stack.pop_to(&outer), 3);
        assert!(stack.is_empty());
    }

    #[test]
    fn pop_to_missing_artifact_empties_the_stack() {
        let mut stack = ArtifactStack::new();
        stack.push(ExecutionArtifact::screen("a"));
        stack.push(ExecutionArtifact::screen("b"));
        let absent = ExecutionArtifact::screen("zzz");
        assert_eq!(stack.pop_to(&absent), 2);
        assert!(stack.is_empty());
    }
}
