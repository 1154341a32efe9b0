//! Seccomp BPF filter for dangerous syscalls.
//!
//! The filter compiles to a default-allow program where each dangerous
//! syscall returns EPERM. It is serialized as raw `sock_filter` words into
//! a private tempfile that the outer shell opens on fd 3 for
//! `bwrap --seccomp 3`; the file lives as long as the child.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use seccompiler::{BpfProgram, SeccompAction, SeccompFilter, SeccompRule, TargetArch};

use crate::error::FenceError;

/// Syscalls the sandbox refuses outright: tracing and memory injection,
/// keyring access, kernel module and kexec control, mount manipulation,
/// swap, host identity, and raw port I/O. Entries missing on an
/// architecture are simply absent from its table.
pub fn dangerous_syscalls() -> Vec<(&'static str, libc::c_long)> {
    let mut table: Vec<(&'static str, libc::c_long)> = vec![
        ("ptrace", libc::SYS_ptrace),
        ("process_vm_readv", libc::SYS_process_vm_readv),
        ("process_vm_writev", libc::SYS_process_vm_writev),
        ("keyctl", libc::SYS_keyctl),
        ("add_key", libc::SYS_add_key),
        ("request_key", libc::SYS_request_key),
        ("personality", libc::SYS_personality),
        ("userfaultfd", libc::SYS_userfaultfd),
        ("perf_event_open", libc::SYS_perf_event_open),
        ("bpf", libc::SYS_bpf),
        ("kexec_load", libc::SYS_kexec_load),
        ("kexec_file_load", libc::SYS_kexec_file_load),
        ("reboot", libc::SYS_reboot),
        ("syslog", libc::SYS_syslog),
        ("acct", libc::SYS_acct),
        ("mount", libc::SYS_mount),
        ("umount2", libc::SYS_umount2),
        ("pivot_root", libc::SYS_pivot_root),
        ("swapon", libc::SYS_swapon),
        ("swapoff", libc::SYS_swapoff),
        ("sethostname", libc::SYS_sethostname),
        ("setdomainname", libc::SYS_setdomainname),
        ("init_module", libc::SYS_init_module),
        ("finit_module", libc::SYS_finit_module),
        ("delete_module", libc::SYS_delete_module),
    ];
    #[cfg(target_arch = "x86_64")]
    {
        table.push(("ioperm", libc::SYS_ioperm));
        table.push(("iopl", libc::SYS_iopl));
    }
    table
}

fn target_arch() -> Result<TargetArch, FenceError> {
    #[cfg(target_arch = "x86_64")]
    return Ok(TargetArch::x86_64);
    #[cfg(target_arch = "aarch64")]
    return Ok(TargetArch::aarch64);
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    Err(FenceError::UnsupportedPlatform(
        "no seccomp filter for this architecture".to_string(),
    ))
}

/// Compile the dangerous-syscall program.
pub fn build_program() -> Result<BpfProgram, FenceError> {
    let mut rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();
    for (_, number) in dangerous_syscalls() {
        // An empty rule vector matches on the syscall number alone.
        rules.insert(number as i64, Vec::new());
    }

    let filter = SeccompFilter::new(
        rules,
        SeccompAction::Allow,
        SeccompAction::Errno(libc::EPERM as u32),
        target_arch()?,
    )
    .map_err(|e| FenceError::Setup(format!("seccomp filter: {e:?}")))?;

    filter
        .try_into()
        .map_err(|e| FenceError::Setup(format!("seccomp compilation: {e:?}")))
}

/// Serialize a program as little-endian (code, jt, jf, k) filter words.
pub fn serialize_program(program: &BpfProgram) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(program.len() * 8);
    for insn in program {
        bytes.extend_from_slice(&insn.code.to_le_bytes());
        bytes.push(insn.jt);
        bytes.push(insn.jf);
        bytes.extend_from_slice(&insn.k.to_le_bytes());
    }
    bytes
}

/// A serialized filter on disk, removed when dropped.
pub struct SeccompFilterFile {
    path: PathBuf,
}

impl SeccompFilterFile {
    /// Compile and write the filter to a mode-0600 tempfile.
    pub fn write() -> Result<Self, FenceError> {
        use rand::Rng;
        use std::os::unix::fs::OpenOptionsExt;

        let program = build_program()?;
        let bytes = serialize_program(&program);

        let suffix: u32 = rand::thread_rng().gen();
        let path = std::env::temp_dir().join(format!(
            "fence-seccomp-{}-{suffix:08x}.bpf",
            std::process::id()
        ));
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)?;
        file.write_all(&bytes)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for SeccompFilterFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_no_duplicate_numbers() {
        let table = dangerous_syscalls();
        let mut numbers: Vec<_> = table.iter().map(|(_, n)| *n).collect();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), table.len());
    }

    #[test]
    fn program_compiles_and_serializes_to_word_multiple() {
        let program = build_program().unwrap();
        assert!(!program.is_empty());
        let bytes = serialize_program(&program);
        assert_eq!(bytes.len(), program.len() * 8);
        assert_eq!(bytes.len() % 8, 0);
    }

    #[test]
    fn filter_file_is_private_and_cleaned_up() {
        use std::os::unix::fs::PermissionsExt;

        let path = {
            let file = SeccompFilterFile::write().unwrap();
            let metadata = std::fs::metadata(file.path()).unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
            assert!(metadata.len() > 0);
            file.path().clone()
        };
        assert!(!path.exists());
    }
}
