//! Simple-build rendering rules
//!
//! Scratch builds: fetch sources from git, build the image, push it to a
//! registry. Beyond the common steps the only extra wiring is the metadata
//! reporting URL.

use super::{set_report_arg, BuildRequest};
use crate::error::Result;
use crate::pipeline::PipelineManipulator;

impl BuildRequest {
    pub(super) fn render_simple(&self, dj: &mut PipelineManipulator) -> Result<()> {
        set_report_arg(dj, "url", self.spec().require_str("orchestrator_url")?)
    }
}
