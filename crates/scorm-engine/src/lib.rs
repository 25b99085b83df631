//! SCORM package ingestion and sequencing engine.
//!
//! Turns an `imsmanifest.xml` into an immutable course structure and serves
//! learners from it: which SCOs they may launch, where navigation goes next,
//! and how their attempts progress.
//!
//! Ingestion runs [`parser`] → [`resolver`] → [`tree`] → [`validator`]
//! (bundled as [`ingest::ingest`]). The [`runtime`] then answers the four
//! learner verbs over an [`store::AttemptStore`], and [`api`] puts them on HTTP.

pub mod api;
pub mod attempt;
pub mod cmi;
pub mod config;
pub mod error;
pub mod ingest;
pub mod manifest;
pub mod parser;
pub mod prerequisite;
pub mod resolver;
pub mod runtime;
pub mod sequencing;
mod simple_sequencing;
pub mod source;
pub mod store;
pub mod tree;
pub mod validator;

pub use api::{create_router, AppState, CmiValue, CommitRequest, ErrorResponse, PackageSummary};
pub use attempt::{
    AttemptState, AttemptTracker, CommitOutcome, CompletionReport, CompletionStatus, EntryMode,
    LearnerAttempts, SessionStart, SuccessStatus, TrackerPolicy, MAX_SUSPEND_DATA_BYTES,
};
pub use cmi::is_supported_element;
pub use config::{Config, SchemaDetection};
pub use error::{AttemptError, ParseError, ResolveError, Result, ScormError, TextPosition};
pub use ingest::{ingest, ingest_with, IngestedPackage};
pub use manifest::{Item, Manifest, Organization, Resource, SchemaVersion, ScormType};
pub use parser::{parse, parse_with, ParseOptions};
pub use prerequisite::{AttemptLookup, ExpressionError, PrerequisiteExpr};
pub use resolver::{launch_href, resolve, resolve_manifest, LaunchTarget, ResolvedItem, ResolvedOrganization};
pub use runtime::RuntimeService;
pub use sequencing::{NavigationOutcome, Sequencer};
pub use source::{package_id_for, DirectoryPackageSource, PackageSource, MANIFEST_FILE_NAME};
pub use store::{AttemptStore, JsonFileAttemptStore, LearnerKey, MemoryAttemptStore};
pub use tree::{build, CourseStructure, OutlineNode, Sco};
pub use validator::{validate, ValidationReport};
