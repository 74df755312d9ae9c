//! Spawning tools inside a killable process group.
//!
//! Every process a supervisor starts joins the same group, so killing the
//! group also takes down whatever the tools spawned themselves. On Unix the
//! group is a POSIX process group led by the first process; on Windows it is
//! a Job Object that kills its members when closed.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::process::{Child, Command};

use crate::config::ProcessPriority;

/// Serialises process creation across all jobs.
///
/// Spawning, joining the group and adjusting priority are separate OS calls;
/// the lock keeps that sequence atomic with respect to other jobs. It is not
/// held while a process runs.
#[derive(Debug, Clone, Default)]
pub struct SpawnLock(Arc<Mutex<()>>);

impl SpawnLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A revocable handle over every process of one supervised run.
///
/// Acquired on the first spawn. Dropping the group kills whatever is still
/// in it.
#[derive(Debug, Default)]
pub struct ProcessGroup {
    #[cfg(unix)]
    leader: Option<nix::unistd::Pid>,
    #[cfg(windows)]
    job: Option<windows::JobObject>,
}

impl ProcessGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_acquired(&self) -> bool {
        #[cfg(unix)]
        {
            self.leader.is_some()
        }
        #[cfg(windows)]
        {
            self.job.is_some()
        }
        #[cfg(not(any(unix, windows)))]
        {
            false
        }
    }

    /// Spawns `cmd` as a member of this group.
    pub fn spawn(
        &mut self,
        cmd: &mut Command,
        lock: &SpawnLock,
        priority: ProcessPriority,
    ) -> io::Result<Child> {
        let _guard = lock.acquire();
        cmd.kill_on_drop(true);

        #[cfg(unix)]
        {
            let pgid = self.leader.map_or(0, |pid| pid.as_raw());
            cmd.process_group(pgid);
            let child = cmd.spawn()?;
            if self.leader.is_none() {
                self.leader = child.id().map(|pid| nix::unistd::Pid::from_raw(pid as i32));
            }
            unix::apply_priority(&child, priority);
            Ok(child)
        }

        #[cfg(windows)]
        {
            use windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
            if self.job.is_none() {
                match windows::JobObject::create() {
                    Ok(job) => self.job = Some(job),
                    Err(e) => tracing::warn!("Failed to create job object: {e}"),
                }
            }
            let child = cmd.spawn()?;
            if let Some(job) = &self.job {
                job.assign(&child);
            }
            windows::apply_priority(&child, priority);
            Ok(child)
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = priority;
            cmd.spawn()
        }
    }

    /// Kills every process in the group. Safe to call any number of times.
    pub fn kill(&self) {
        #[cfg(unix)]
        if let Some(leader) = self.leader {
            use nix::errno::Errno;
            use nix::sys::signal::{Signal, killpg};
            // The group id stays reserved while any member is alive, so an
            // empty group is the only case that reports ESRCH.
            match killpg(leader, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => tracing::warn!("Failed to kill process group {leader}: {e}"),
            }
        }

        #[cfg(windows)]
        if let Some(job) = &self.job {
            job.terminate();
        }
    }

    /// Gives the group up without signalling it.
    ///
    /// Called once the supervised processes have been reaped. By then the
    /// Unix group id may already be free for reuse, so stragglers are only
    /// killed by the earlier grace-period kills. A Job Object handle cannot be
    /// recycled and still takes its remaining members down.
    pub fn release(&mut self) {
        #[cfg(unix)]
        {
            self.leader = None;
        }
        #[cfg(windows)]
        if let Some(job) = self.job.take() {
            job.terminate();
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
mod unix {
    use nix::libc;
    use tokio::process::Child;

    use crate::config::ProcessPriority;

    pub(super) fn apply_priority(child: &Child, priority: ProcessPriority) {
        let nice = match priority {
            ProcessPriority::Normal => return,
            ProcessPriority::BelowNormal => 10,
            ProcessPriority::Idle => 19,
        };
        let Some(pid) = child.id() else {
            return;
        };
        // SAFETY: plain syscall on a pid we own; failure is reported via the return value.
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, nice) };
        if rc != 0 {
            tracing::debug!(
                "Failed to lower priority of process {pid}: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::ffi::c_void;
    use std::io;
    use std::mem;
    use std::ptr;

    use tokio::process::Child;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::System::JobObjects::{
        AssignProcessToJobObject, CreateJobObjectW, JOB_OBJECT_LIMIT_DIE_ON_UNHANDLED_EXCEPTION,
        JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE, JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
        JobObjectExtendedLimitInformation, SetInformationJobObject, TerminateJobObject,
    };
    use windows_sys::Win32::System::Threading::{
        BELOW_NORMAL_PRIORITY_CLASS, IDLE_PRIORITY_CLASS, SetPriorityClass,
    };

    use crate::config::ProcessPriority;

    #[derive(Debug)]
    pub(super) struct JobObject(HANDLE);

    // SAFETY: a job object handle may be used from any thread.
    unsafe impl Send for JobObject {}
    unsafe impl Sync for JobObject {}

    impl JobObject {
        pub(super) fn create() -> io::Result<Self> {
            // SAFETY: null attributes and name are documented as valid.
            let handle = unsafe { CreateJobObjectW(ptr::null(), ptr::null()) };
            if handle.is_null() {
                return Err(io::Error::last_os_error());
            }
            let job = JobObject(handle);

            // SAFETY: the struct is plain data and all-zero is a valid value.
            let mut info: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = unsafe { mem::zeroed() };
            info.BasicLimitInformation.LimitFlags =
                JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE | JOB_OBJECT_LIMIT_DIE_ON_UNHANDLED_EXCEPTION;
            // SAFETY: pointer and length describe `info`, which outlives the call.
            let ok = unsafe {
                SetInformationJobObject(
                    job.0,
                    JobObjectExtendedLimitInformation,
                    &info as *const JOBOBJECT_EXTENDED_LIMIT_INFORMATION as *const c_void,
                    mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
                )
            };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(job)
        }

        pub(super) fn assign(&self, child: &Child) {
            let Some(process) = child.raw_handle() else {
                return;
            };
            // SAFETY: both handles are valid for the duration of the call.
            if unsafe { AssignProcessToJobObject(self.0, process as HANDLE) } == 0 {
                tracing::warn!(
                    "Failed to assign process to job object: {}",
                    io::Error::last_os_error()
                );
            }
        }

        pub(super) fn terminate(&self) {
            // SAFETY: the handle is owned by `self` and still open.
            unsafe {
                TerminateJobObject(self.0, 1);
            }
        }
    }

    impl Drop for JobObject {
        fn drop(&mut self) {
            // SAFETY: closing our own handle exactly once.
            unsafe {
                CloseHandle(self.0);
            }
        }
    }

    pub(super) fn apply_priority(child: &Child, priority: ProcessPriority) {
        let class = match priority {
            ProcessPriority::Normal => return,
            ProcessPriority::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
            ProcessPriority::Idle => IDLE_PRIORITY_CLASS,
        };
        let Some(process) = child.raw_handle() else {
            return;
        };
        // SAFETY: the process handle is valid while `child` is alive.
        unsafe {
            if SetPriorityClass(process as HANDLE, class) == 0 {
                SetPriorityClass(process as HANDLE, IDLE_PRIORITY_CLASS);
            }
        }
    }
}
