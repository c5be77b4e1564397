//! Agent view controller and the capabilities it drives.
//!
//! The controller reacts to stage events by mutating a [`Document`]. Letter
//! splitting and animation are injected through [`TextSplitter`] and
//! [`Animator`] so the event handling can run without a real page.

pub mod animator;
pub mod controller;
pub mod dom;
pub mod splitter;
pub mod timeline;
pub mod words;

pub use animator::{AnimationHandle, Animator, TokioAnimator};
pub use controller::{AgentSnapshot, AgentViewController};
pub use dom::{Document, Element, MemoryDocument, Node, SharedDocument};
pub use splitter::{Letter, LetterSplitter, TextSplitter};
pub use timeline::{Easing, Keyframe, Timeline};
pub use words::{Segment, group_words};
