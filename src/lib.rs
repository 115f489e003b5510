//! # certpress - Certificate Rendering Library
//!
//! certpress renders certificates from declarative templates and data rows,
//! one per spreadsheet record, and bundles them into a zip archive. It
//! provides:
//!
//! - **Templates**: a JSON template model with text and image layers
//! - **Rendering**: PNG/JPEG canvas, single-page PDF, and overlay onto an
//!   existing PDF through an external helper
//! - **Batches**: sequential row rendering under per-row deadlines, tracked
//!   state, zip packaging
//! - **HTTP API**: uploads, templates, batches and live preview
//!
//! ## Quick Start
//!
//! ```no_run
//! use certpress::{
//!     render::{ItemRenderer, RenderOutput, Renderer},
//!     rows::Row,
//!     template::TemplateStore,
//!     Settings,
//! };
//!
//! # async fn example() -> Result<(), certpress::CertError> {
//! let settings = Settings::with_data_dir("/srv/certpress");
//! settings.ensure_dirs()?;
//!
//! let templates = TemplateStore::new(settings.templates_path());
//! templates.seed_if_missing().await?;
//! let template = templates.get("default-1").await?.expect("seeded");
//!
//! let mut row = Row::new();
//! row.insert("name".to_string(), "Ann".to_string());
//!
//! let renderer = Renderer::from_settings(&settings)?;
//! if let RenderOutput::File(path) = renderer.render(&template, &row, Some("ann.pdf")).await? {
//!     println!("wrote {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`template`] | Template model, placeholder resolution, text formatting, storage |
//! | [`rows`] | Spreadsheet row source and field mapping |
//! | [`render`] | Single-certificate renderer and its backends |
//! | [`batch`] | Batch records, orchestration and archiving |
//! | [`server`] | axum HTTP API |
//! | [`config`] | Settings |
//! | [`error`] | Error types |

pub mod batch;
pub mod config;
pub mod error;
pub mod render;
pub mod rows;
pub mod server;
pub mod template;

// Re-exports for convenience
pub use config::{FailurePolicy, Settings};
pub use error::CertError;
pub use render::Renderer;
pub use template::{Template, TemplateStore};
