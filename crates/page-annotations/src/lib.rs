pub mod arena;
pub mod decorator;
pub mod dom;
pub mod errors;
pub mod events;
pub mod extractor;
pub mod interaction;
pub mod metrics;
pub mod normalizer;
pub mod policy;
pub mod session;
pub mod text;

pub use arena::ArenaDocument;
pub use decorator::{DecorateOutcome, DecorateReport, Decoration, Diagnostic, Replacement};
pub use dom::{Document, DomError, ListenerPhase, NodeId, NodeKind, PointerEvent, TapListener};
pub use errors::AnnotationError;
pub use extractor::{Extraction, Section};
pub use interaction::{InteractionHandler, TapOutcome, TapReport, TapState, VetoReason};
pub use normalizer::normalize;
pub use policy::AnnotationPolicy;
pub use session::AnnotationSession;
