//! Isolation policy for sandboxed container runs
//!
//! A policy is turned into `docker run` flags. Callers may tune resources,
//! image and timeout; network isolation, the read-only root, dropped
//! capabilities and size-capped no-exec scratch mounts are always emitted.
//! The executor refuses a policy whose user is root or not numeric.
//!
//! ```text
//! docker run --rm --name cody-sandbox-<uuid>
//!            --memory 128m --cpus 0.5 --pids-limit 64 --user 65534:65534
//!            --workdir /sandbox
//!            --tmpfs /tmp:rw,noexec,nosuid,size=16m
//!            --tmpfs /sandbox:rw,noexec,nosuid,size=16m
//!            --network none --read-only --cap-drop ALL
//!            --security-opt no-new-privileges
//!            python:3.12-alpine python -c <code>
//! ```

use std::time::Duration;

/// Working directory inside the container (a tmpfs mount)
pub const SANDBOX_WORKDIR: &str = "/sandbox";

/// Size cap for each writable tmpfs mount
pub const SCRATCH_SIZE: &str = "16m";

/// Resource and capability policy for one sandbox execution
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxPolicy {
    /// Container runtime CLI (e.g., "docker" or an absolute path)
    pub runtime: String,
    /// Image the guest code runs in
    pub image: String,
    /// Hard wall-clock limit for the whole `docker run`
    pub timeout: Duration,
    /// Memory ceiling in docker notation (e.g., "128m")
    pub memory: String,
    /// CPU share (e.g., "0.5" = half a core)
    pub cpus: String,
    /// Maximum number of processes inside the container
    pub pids_limit: u32,
    /// Numeric uid:gid the guest runs as; neither may be 0
    pub user: String,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            image: "python:3.12-alpine".to_string(),
            timeout: Duration::from_secs(5),
            memory: "128m".to_string(),
            cpus: "0.5".to_string(),
            pids_limit: 64,
            user: "65534:65534".to_string(),
        }
    }
}

impl SandboxPolicy {
    /// Same policy with a different timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `docker run` flags for a container named `container_name`
    pub fn to_docker_flags(&self, container_name: &str) -> Vec<String> {
        let scratch = |mount: &str| format!("{}:rw,noexec,nosuid,size={}", mount, SCRATCH_SIZE);

        let mut flags: Vec<String> = vec![
            "--rm".into(),
            "--name".into(),
            container_name.into(),
            "--memory".into(),
            self.memory.clone(),
            "--cpus".into(),
            self.cpus.clone(),
            "--pids-limit".into(),
            self.pids_limit.to_string(),
            "--user".into(),
            self.user.clone(),
            "--workdir".into(),
            SANDBOX_WORKDIR.into(),
            "--tmpfs".into(),
            scratch("/tmp"),
            "--tmpfs".into(),
            scratch(SANDBOX_WORKDIR),
        ];

        flags.extend([
            "--network".into(),
            "none".into(),
            "--read-only".into(),
            "--cap-drop".into(),
            "ALL".into(),
            "--security-opt".into(),
            "no-new-privileges".into(),
        ]);

        flags
    }

    /// Reject a user that is not `uid[:gid]` with non-zero numeric ids
    pub fn check_user(&self) -> Result<(), String> {
        let mut ids = self.user.splitn(2, ':');
        let uid = ids.next().unwrap_or_default();
        let gid = ids.next();

        let non_root = |id: &str| matches!(id.parse::<u32>(), Ok(n) if n != 0);
        if non_root(uid) && gid.map_or(true, non_root) {
            Ok(())
        } else {
            Err(format!(
                "sandbox user '{}' must be a non-root numeric uid[:gid]",
                self.user
            ))
        }
    }

    /// Full argument list after the runtime binary: `run <flags> <image> python -c <code>`
    pub fn run_args(&self, container_name: &str, code: &str) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        args.extend(self.to_docker_flags(container_name));
        args.push(self.image.clone());
        args.extend(["python".to_string(), "-c".to_string(), code.to_string()]);
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag_value<'a>(flags: &'a [String], flag: &str) -> Option<&'a str> {
        flags
            .iter()
            .position(|f| f == flag)
            .and_then(|i| flags.get(i + 1))
            .map(|s| s.as_str())
    }

    #[test]
    fn test_default_policy_restriction_flags() {
        let flags = SandboxPolicy::default().to_docker_flags("cody-sandbox-test");

        assert_eq!(flag_value(&flags, "--network"), Some("none"));
        assert!(flags.contains(&"--read-only".to_string()));
        assert_eq!(flag_value(&flags, "--cap-drop"), Some("ALL"));
        assert_eq!(flag_value(&flags, "--memory"), Some("128m"));
        assert_eq!(flag_value(&flags, "--pids-limit"), Some("64"));
        assert_eq!(flag_value(&flags, "--user"), Some("65534:65534"));
        assert_eq!(flag_value(&flags, "--name"), Some("cody-sandbox-test"));
        assert_eq!(flags[0], "--rm");
    }

    #[test]
    fn test_scratch_mounts_are_noexec_and_capped() {
        let flags = SandboxPolicy::default().to_docker_flags("c");
        let tmpfs: Vec<_> = flags
            .iter()
            .enumerate()
            .filter(|(_, f)| f.as_str() == "--tmpfs")
            .map(|(i, _)| flags[i + 1].as_str())
            .collect();

        assert_eq!(tmpfs, vec![
            "/tmp:rw,noexec,nosuid,size=16m",
            "/sandbox:rw,noexec,nosuid,size=16m",
        ]);
        assert_eq!(flag_value(&flags, "--workdir"), Some("/sandbox"));
    }

    #[test]
    fn test_isolation_survives_resource_tuning() {
        let policy = SandboxPolicy {
            memory: "512m".to_string(),
            cpus: "2".to_string(),
            pids_limit: 256,
            image: "python:3.12-slim".to_string(),
            ..SandboxPolicy::default()
        };
        let flags = policy.to_docker_flags("c");

        assert_eq!(flag_value(&flags, "--network"), Some("none"));
        assert!(flags.contains(&"--read-only".to_string()));
        assert_eq!(flag_value(&flags, "--cap-drop"), Some("ALL"));
        assert_eq!(flag_value(&flags, "--security-opt"), Some("no-new-privileges"));
        assert_eq!(flag_value(&flags, "--memory"), Some("512m"));
    }

    #[test]
    fn test_root_or_named_user_rejected() {
        for user in ["0:0", "0", "1000:0", "root", "nobody:nogroup", "", ":", "-1:-1"] {
            let policy = SandboxPolicy {
                user: user.to_string(),
                ..SandboxPolicy::default()
            };
            assert!(policy.check_user().is_err(), "accepted user {:?}", user);
        }

        for user in ["65534:65534", "1000", "1000:1000"] {
            let policy = SandboxPolicy {
                user: user.to_string(),
                ..SandboxPolicy::default()
            };
            assert!(policy.check_user().is_ok(), "rejected user {:?}", user);
        }
    }

    #[test]
    fn test_run_args_order() {
        let args = SandboxPolicy::default().run_args("c", "print(1)");
        assert_eq!(args[0], "run");
        let tail = &args[args.len() - 4..];
        assert_eq!(tail, ["python:3.12-alpine", "python", "-c", "print(1)"]);
    }
}
