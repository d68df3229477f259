//! Interactive 3D garment viewer and scene compositor.
//!
//! A [`Viewer`] loads a single mesh asset, normalizes it into a predictable
//! frame, colors it, composes it against a swappable backdrop and renders it
//! continuously through a [`Presenter`]. Loading and composition are plain
//! library code that runs headless; the wgpu backend in [`render`] is one
//! presenter among others.

pub mod app;
pub mod backdrop;
pub mod bundle;
pub mod camera;
pub mod config;
pub mod error;
pub mod geometry;
pub mod input;
pub mod material;
pub mod mesh;
pub mod mtl;
pub mod obj;
pub mod render;
pub mod render_loop;
pub mod resolver;
pub mod resources;
pub mod scene;
pub mod source;
pub mod stage;
pub mod texture;
pub mod viewer;
pub mod viewport;

pub use app::{apply_command, print_summary, summary_lines, HeadlessPresenter};
pub use backdrop::{BackdropComposer, BackdropInstance, BackdropVariant, LightRig};
pub use bundle::SceneBundle;
pub use camera::{CameraFramer, CameraState};
pub use config::{BackdropKind, BackdropParams, ViewerConfig, ViewerTuning};
pub use error::{BackdropFallback, FetchError, LoadFailure, LoadWarning, ViewerError};
pub use geometry::{normalize, scale_factor, Bounds, NormalizeOptions};
pub use input::{KeyBindings, KeyCode, NamedKey, ViewerCommand};
pub use material::{Material, MaterialApplicator, MaterialOrigin};
pub use mesh::{MeshData, MeshHierarchy, MeshNode, RenderableMesh, Transform};
pub use mtl::{parse_mtl, MaterialLibrary};
pub use obj::{parse_obj, ObjModel};
pub use render::{CameraParams, LightParams, Renderer};
pub use render_loop::{FrameStats, LoopState, Presenter, RenderLoop};
pub use resolver::{AssetResolver, AssetState, LoadOutcome, LoadProgress, LoadedAsset};
pub use resources::{ResourceId, ResourceLedger};
pub use scene::BundleScene;
pub use source::{AssetOrigin, AssetSource, MemorySource};
pub use stage::{AttachResult, FrameSnapshot, Stage};
pub use viewer::{LoadTask, Viewer};
pub use viewport::{StaticViewport, ViewportProvider, WindowViewport};
