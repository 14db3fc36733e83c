//! Native SVG minification
//!
//! Sources are parsed into a `usvg` tree, which drops editor metadata,
//! resolves styles and normalises paths, and then written back compactly with
//! the configured numeric precision.

use super::runner::EncodeError;
use assetopt_config::SvgOptions;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use usvg::fontdb;

/// Minifies SVG documents with a shared font database.
///
/// Fonts are needed to lay out `<text>` when it is converted to paths and to
/// keep text nodes from being dropped while parsing.
#[derive(Clone)]
pub struct SvgOptimizer {
    options: SvgOptions,
    fontdb: Arc<fontdb::Database>,
}

impl SvgOptimizer {
    /// Optimizer backed by the system fonts
    pub fn new(options: SvgOptions) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        debug!(faces = db.len(), "loaded system fonts for SVG text");
        Self::with_fontdb(options, Arc::new(db))
    }

    pub fn with_fontdb(options: SvgOptions, fontdb: Arc<fontdb::Database>) -> Self {
        Self { options, fontdb }
    }

    pub fn options(&self) -> &SvgOptions {
        &self.options
    }

    /// Minify an SVG document held in memory.
    pub fn optimize(&self, svg: &str, resources_dir: Option<&Path>) -> Result<String, EncodeError> {
        let opts = usvg::Options {
            resources_dir: resources_dir.map(Path::to_path_buf),
            fontdb: Arc::clone(&self.fontdb),
            ..Default::default()
        };

        let tree = usvg::Tree::from_str(svg, &opts).map_err(|e| EncodeError::Svg(e.to_string()))?;
        Ok(tree.to_string(&self.write_options()))
    }

    /// Minify `input` into `output`, creating parent directories as needed.
    pub fn optimize_file(&self, input: &Path, output: &Path) -> Result<(), EncodeError> {
        let source = fs::read_to_string(input)?;
        let minified = self.optimize(&source, input.parent())?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, minified)?;

        debug!(
            input = %input.display(),
            output = %output.display(),
            "svg minified"
        );
        Ok(())
    }

    fn write_options(&self) -> usvg::WriteOptions {
        usvg::WriteOptions {
            id_prefix: self.options.id_prefix.clone(),
            preserve_text: self.options.preserve_text,
            coordinates_precision: self.options.coordinates_precision,
            transforms_precision: self.options.transforms_precision,
            use_single_quote: self.options.use_single_quote,
            indent: usvg::Indent::None,
            attributes_indent: usvg::Indent::None,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for SvgOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvgOptimizer")
            .field("options", &self.options)
            .field("font_faces", &self.fontdb.len())
            .finish()
    }
}
