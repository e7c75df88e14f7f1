//! Production-build rendering rules
//!
//! The production variant layers koji/pulp integration, implicit image
//! labels, release bumping, and secret injection on top of the common
//! rendering steps. Several stages are conditionally removed: without
//! triggers there is nothing for the rebuild-driven stages to do, and the
//! koji-fetch stage gives way to explicit yum repos.

use super::{
    set_report_arg, BuildRequest, SECRETS_ROOT, STAGE_ADD_LABELS, STAGE_BUMP_RELEASE,
    STAGE_CHECK_AND_SET_REBUILD, STAGE_FETCH_SOURCES, STAGE_IMPORT_IMAGE, STAGE_KOJI,
    STAGE_NFS_COPY, STAGE_PULL_BASE_IMAGE, STAGE_PULP_PUSH, STAGE_SENDMAIL,
};
use crate::descriptor::{OuterDescriptor, SecretMount, SecretRef};
use crate::error::{Error, Result};
use crate::pipeline::{PipelineManipulator, StageGroup};
use crate::utils::insert_userinfo;
use serde_json::{Map, Value};
use tracing::info;

impl BuildRequest {
    pub(super) fn render_production(
        &self,
        template: &mut OuterDescriptor,
        dj: &mut PipelineManipulator,
    ) -> Result<()> {
        dj.set_arg(
            StageGroup::PreBuild,
            STAGE_FETCH_SOURCES,
            "command",
            self.spec().require_str("sources_command")?,
        )?;
        dj.set_arg(
            StageGroup::PreBuild,
            STAGE_PULL_BASE_IMAGE,
            "parent_registry",
            self.spec().require_str("registry_uri")?,
        )?;

        let mut implicit_labels = Map::new();
        for (label, param) in [
            ("Architecture", "architecture"),
            ("Vendor", "vendor"),
            ("Build_Host", "build_host"),
            ("Authoritative_Registry", "authoritative_registry"),
        ] {
            implicit_labels.insert(
                label.to_string(),
                Value::String(self.spec().require_str(param)?.to_string()),
            );
        }
        dj.merge_arg(
            StageGroup::PreBuild,
            STAGE_ADD_LABELS,
            "labels",
            implicit_labels,
        )?;

        set_report_arg(dj, "url", self.spec().require_str("orchestrator_url")?)?;

        // Without triggers there is no rebuild flow, so the stages that
        // only matter for rebuilds are dropped.
        if template.trigger_count() == 0 {
            for (group, stage) in [
                (StageGroup::PreBuild, STAGE_CHECK_AND_SET_REBUILD),
                (StageGroup::PreBuild, STAGE_BUMP_RELEASE),
                (StageGroup::PostBuild, STAGE_IMPORT_IMAGE),
            ] {
                info!("removing {} from request because there are no triggers", stage);
                dj.remove_stage(group, stage);
            }
        }

        self.configure_koji(dj)?;
        self.configure_bump_release(template, dj)?;

        self.set_secrets(
            template,
            dj,
            &[
                (
                    StageGroup::PostBuild,
                    STAGE_PULP_PUSH,
                    "pulp_secret_path",
                    self.spec().str_value("pulp_secret").map(str::to_string),
                ),
                (
                    StageGroup::Exit,
                    STAGE_SENDMAIL,
                    "pdc_secret_path",
                    self.spec().str_value("pdc_secret").map(str::to_string),
                ),
            ],
        )?;

        if self.spec().str_value("pulp_secret").is_some() {
            // Pulp handles registry placement itself; keep the unique tag
            // but don't prefix the registry.
            template.spec.output.to.name = self.spec().require_str("image_tag")?.to_string();
        }

        self.configure_nfs_copy(dj)?;
        self.configure_pulp_push(dj)?;
        self.configure_import_image(dj)?;

        Ok(())
    }

    /// Koji-vs-repo exclusivity: explicit yum repos take precedence over
    /// koji, and koji needs all three of target/root/hub to be useful.
    fn configure_koji(&self, dj: &mut PipelineManipulator) -> Result<()> {
        let has_repourls = self
            .spec()
            .str_list("yum_repourls")
            .is_some_and(|urls| !urls.is_empty());
        let koji_params = (
            self.spec().str_value("koji_target"),
            self.spec().str_value("koji_root"),
            self.spec().str_value("koji_hub"),
        );

        if has_repourls {
            info!("removing koji from request, because there is yum repo specified");
            dj.remove_stage(StageGroup::PreBuild, STAGE_KOJI);
        } else if let (Some(target), Some(root), Some(hub)) = koji_params {
            let (target, root, hub) = (target.to_string(), root.to_string(), hub.to_string());
            dj.set_arg(StageGroup::PreBuild, STAGE_KOJI, "target", target)?;
            dj.set_arg(StageGroup::PreBuild, STAGE_KOJI, "root", root)?;
            dj.set_arg(StageGroup::PreBuild, STAGE_KOJI, "hub", hub)?;
        } else {
            info!("removing koji from request as not specified");
            dj.remove_stage(StageGroup::PreBuild, STAGE_KOJI);
        }

        Ok(())
    }

    fn configure_bump_release(
        &self,
        template: &mut OuterDescriptor,
        dj: &mut PipelineManipulator,
    ) -> Result<()> {
        if !dj.has_stage(StageGroup::PreBuild, STAGE_BUMP_RELEASE) {
            return Ok(());
        }

        if let Some(push_url) = self.spec().str_value("git_push_url") {
            let push_url = match self.spec().str_value("git_push_username") {
                Some(username) => insert_userinfo(push_url, username),
                None => push_url.to_string(),
            };
            dj.set_arg(StageGroup::PreBuild, STAGE_BUMP_RELEASE, "push_url", push_url)?;
        }

        // The build checks out the branch tip, while the stage observes the
        // exact commit that triggered it.
        let branch = self.spec().require_str("git_branch")?.to_string();
        info!("bump_release configured so setting source git ref to {}", branch);
        template.spec.source.git.git_ref = branch;
        dj.set_arg(
            StageGroup::PreBuild,
            STAGE_BUMP_RELEASE,
            "git_ref",
            self.spec().require_str("git_ref")?,
        )?;

        Ok(())
    }

    /// Wire configured secrets into stage arguments.
    ///
    /// With the secrets-array scheme each secret becomes a named mount under
    /// [`SECRETS_ROOT`] and the stage argument points at the mount path; the
    /// legacy scheme can only reference a single `sourceSecret`, which the
    /// template must already declare. When nothing was configured, stale
    /// secret substructures left by the template are removed.
    fn set_secrets(
        &self,
        template: &mut OuterDescriptor,
        dj: &mut PipelineManipulator,
        secrets: &[(StageGroup, &str, &str, Option<String>)],
    ) -> Result<()> {
        let mut secret_set = false;

        for (group, stage, arg, secret) in secrets {
            let Some(secret) = secret else { continue };
            secret_set = true;

            if let Some(mounts) = template.spec.strategy.custom_strategy.secrets.as_mut() {
                let secret_path = format!("{}/{}", SECRETS_ROOT, secret);
                info!("configuring {} secret at {}", secret, secret_path);
                mounts.push(SecretMount {
                    secret_source: SecretRef {
                        name: secret.clone(),
                    },
                    mount_path: secret_path.clone(),
                });
                dj.set_arg(*group, stage, arg, secret_path)?;
            } else {
                info!("configuring {} secret as sourceSecret", secret);
                match template.spec.source.source_secret.as_mut() {
                    Some(source_secret) => source_secret.name = secret.clone(),
                    None => {
                        return Err(Error::validation("template does not allow secrets"));
                    }
                }
            }
        }

        if !secret_set {
            template.spec.source.source_secret = None;
            template.spec.strategy.custom_strategy.secrets = None;
        }

        Ok(())
    }

    fn configure_nfs_copy(&self, dj: &mut PipelineManipulator) -> Result<()> {
        match self.spec().str_value("nfs_server_path") {
            Some(server_path) => {
                let server_path = server_path.to_string();
                dj.set_arg(
                    StageGroup::PostBuild,
                    STAGE_NFS_COPY,
                    "nfs_server_path",
                    server_path,
                )?;
                if let Some(dest_dir) = self.spec().str_value("nfs_dest_dir") {
                    let dest_dir = dest_dir.to_string();
                    dj.set_arg(StageGroup::PostBuild, STAGE_NFS_COPY, "nfs_dest_dir", dest_dir)?;
                }
            }
            None => dj.remove_stage(StageGroup::PostBuild, STAGE_NFS_COPY),
        }
        Ok(())
    }

    fn configure_pulp_push(&self, dj: &mut PipelineManipulator) -> Result<()> {
        match self.spec().str_value("pulp_registry") {
            Some(registry) => {
                let registry = registry.to_string();
                dj.set_arg(
                    StageGroup::PostBuild,
                    STAGE_PULP_PUSH,
                    "pulp_registry_name",
                    registry,
                )?;

                // Pushing needs auth one way or another: either a mounted
                // secret or credentials preconfigured on the stage.
                if self.spec().str_value("pulp_secret").is_none() {
                    let args = dj.stage_args(StageGroup::PostBuild, STAGE_PULP_PUSH)?;
                    if !args.contains_key("username") {
                        return Err(Error::validation("pulp registry specified but no auth config"));
                    }
                }
            }
            None => dj.remove_stage(StageGroup::PostBuild, STAGE_PULP_PUSH),
        }
        Ok(())
    }

    fn configure_import_image(&self, dj: &mut PipelineManipulator) -> Result<()> {
        if !dj.has_stage(StageGroup::PostBuild, STAGE_IMPORT_IMAGE) {
            return Ok(());
        }

        dj.set_arg(
            StageGroup::PostBuild,
            STAGE_IMPORT_IMAGE,
            "imagestream",
            self.spec().require_str("imagestream_name")?,
        )?;
        dj.set_arg(
            StageGroup::PostBuild,
            STAGE_IMPORT_IMAGE,
            "docker_image_repo",
            self.spec().require_str("imagestream_url")?,
        )?;
        dj.set_arg(
            StageGroup::PostBuild,
            STAGE_IMPORT_IMAGE,
            "url",
            self.spec().require_str("orchestrator_url")?,
        )?;
        if let Some(use_auth) = self.spec().bool_value("use_auth") {
            dj.set_arg(StageGroup::PostBuild, STAGE_IMPORT_IMAGE, "use_auth", use_auth)?;
        }

        Ok(())
    }
}
