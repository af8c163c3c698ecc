// ABOUTME: Kernel-level confinement for sandbox children
// ABOUTME: Landlock rulesets that allow writes only inside the scratch directory and deny TCP

/// What the host kernel can enforce on a sandbox child
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsolationSupport {
    /// Writes outside the scratch directory are refused
    pub filesystem: bool,
    /// TCP bind and connect are refused
    pub network: bool,
}

impl IsolationSupport {
    /// Check what the running kernel supports. Creating a ruleset does not
    /// restrict the calling process.
    #[cfg(target_os = "linux")]
    pub fn detect() -> Self {
        Self {
            filesystem: landlock_rules::filesystem_supported(),
            network: landlock_rules::network_supported(),
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn detect() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.filesystem && self.network
    }
}

/// Restrictions a single child enters between fork and exec
#[cfg(unix)]
pub(crate) struct Confinement {
    #[cfg(target_os = "linux")]
    ruleset: Option<landlock::RulesetCreated>,
    #[cfg(target_os = "linux")]
    unshare_network: bool,
    network_enforced: bool,
    required: bool,
}

#[cfg(unix)]
impl Confinement {
    pub(crate) fn for_run(
        scratch: &std::path::Path,
        support: IsolationSupport,
        config: &crate::types::SandboxConfig,
    ) -> std::io::Result<Self> {
        #[cfg(target_os = "linux")]
        let ruleset = landlock_rules::for_run(scratch, support).map_err(std::io::Error::other)?;
        #[cfg(not(target_os = "linux"))]
        let _ = scratch;

        Ok(Self {
            #[cfg(target_os = "linux")]
            ruleset,
            #[cfg(target_os = "linux")]
            unshare_network: config.isolate_network,
            network_enforced: support.network,
            required: config.require_isolation,
        })
    }

    /// Runs in the child after fork. Only issues syscalls.
    pub(crate) fn enter(&mut self) -> std::io::Result<()> {
        use nix::errno::Errno;

        #[cfg(target_os = "linux")]
        {
            use nix::sched::{unshare, CloneFlags};

            let mut network_enforced = self.network_enforced;
            if self.unshare_network {
                // Kernels without unprivileged user namespaces keep the host network
                network_enforced |=
                    unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNET).is_ok();
            }
            if self.required && !network_enforced {
                return Err(Errno::EPERM.into());
            }

            if let Some(ruleset) = self.ruleset.take() {
                ruleset.restrict_self().map_err(|_| Errno::EPERM)?;
            }
            Ok(())
        }

        #[cfg(not(target_os = "linux"))]
        {
            if self.required && !self.network_enforced {
                return Err(Errno::EPERM.into());
            }
            Ok(())
        }
    }
}

#[cfg(target_os = "linux")]
pub(crate) mod landlock_rules {
    use landlock::{
        path_beneath_rules, Access, AccessFs, AccessNet, CompatLevel, Compatible, Ruleset,
        RulesetAttr, RulesetCreated, RulesetCreatedAttr, RulesetError, ABI,
    };
    use std::path::Path;

    use super::IsolationSupport;

    const ABI_LEVEL: ABI = ABI::V4;

    pub(super) fn filesystem_supported() -> bool {
        Ruleset::default()
            .set_compatibility(CompatLevel::HardRequirement)
            .handle_access(AccessFs::from_all(ABI::V1))
            .and_then(|ruleset| ruleset.create())
            .is_ok()
    }

    pub(super) fn network_supported() -> bool {
        Ruleset::default()
            .set_compatibility(CompatLevel::HardRequirement)
            .handle_access(AccessNet::from_all(ABI::V4))
            .and_then(|ruleset| ruleset.create())
            .is_ok()
    }

    /// Build the ruleset for one run in the parent. The child only has to
    /// call `restrict_self` on it before exec.
    ///
    /// Everything is readable and executable; only `scratch` is writable.
    /// With network support, no TCP port may be bound or connected to.
    pub(crate) fn for_run(
        scratch: &Path,
        support: IsolationSupport,
    ) -> Result<Option<RulesetCreated>, RulesetError> {
        if !support.filesystem {
            return Ok(None);
        }

        let mut ruleset = Ruleset::default().handle_access(AccessFs::from_all(ABI_LEVEL))?;
        if support.network {
            ruleset = ruleset.handle_access(AccessNet::from_all(ABI_LEVEL))?;
        }

        let created = ruleset
            .create()?
            .add_rules(path_beneath_rules([Path::new("/")], AccessFs::from_read(ABI_LEVEL)))?
            .add_rules(path_beneath_rules([scratch], AccessFs::from_all(ABI_LEVEL)))?;

        Ok(Some(created))
    }
}
