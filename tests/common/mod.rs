//! Shared fixtures: fake CRIU scripts and a forked stand-in for the target
//! process that records completion signals.

#![allow(dead_code)]

use std::ffi::CString;
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use criuengine::notify::{completion_signal, sigval_payload};

pub const ARGS_FILE: &str = "criu.args";

pub fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_criuengine"))
}

/// Writes an executable `criu` into `dir` that records its arguments, one
/// per line, and exits with `exit_code`.
pub fn fake_tool(dir: &Path, exit_code: i32) -> PathBuf {
    let path = dir.join("criu");
    let script = format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\nexit {}\n",
        dir.join(ARGS_FILE).display(),
        exit_code
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Arguments the fake tool was run with, without `argv[0]`.
pub fn recorded_args(dir: &Path) -> Option<Vec<String>> {
    let text = fs::read_to_string(dir.join(ARGS_FILE)).ok()?;
    Some(text.lines().map(str::to_string).collect())
}

const READY: i32 = 0;
const EXITED: i32 = 1;
const PAYLOAD: i32 = 2;

/// Time allowed for further signals once one has arrived.
const GRACE: Duration = Duration::from_millis(300);

/// The helper to run as a child of the target, prepared before forking.
pub struct Launch {
    argv: Vec<CString>,
    envp: Vec<CString>,
    stderr: File,
}

impl Launch {
    pub fn new(args: &[&str], env: &[(&str, &str)], stderr: &Path) -> Self {
        let mut argv = vec![CString::new(bin().as_os_str().as_bytes()).unwrap()];
        argv.extend(args.iter().map(|a| CString::new(*a).unwrap()));

        let mut envp: Vec<CString> = env
            .iter()
            .map(|(k, v)| CString::new(format!("{}={}", k, v)).unwrap())
            .collect();
        if let Some(path) = std::env::var_os("PATH") {
            let mut entry = b"PATH=".to_vec();
            entry.extend_from_slice(path.as_bytes());
            envp.push(CString::new(entry).unwrap());
        }

        Launch {
            argv,
            envp,
            stderr: File::create(stderr).unwrap(),
        }
    }
}

/// What the target observed.
#[derive(Debug)]
pub struct TargetReport {
    pub pid: i32,
    /// Exit code of the helper, when it was launched by the target.
    pub helper_exit: Option<i32>,
    pub payloads: Vec<i32>,
}

/// A forked process that blocks the completion signal and reports every
/// instance it receives back over a pipe.
pub struct Target {
    pub pid: i32,
    reader: File,
    helper_exit: Option<i32>,
    payloads: Vec<i32>,
}

impl Target {
    /// Forks the target. With `launch`, the target runs the helper as its own
    /// child first (so the helper's parent is the target). Then it waits up
    /// to `window` for a first signal.
    pub fn spawn(launch: Option<Launch>, window: Duration) -> Target {
        let sig = completion_signal();
        let window = timespec(window);
        let grace = timespec(GRACE);

        let prepared = launch.as_ref().map(|l| {
            let mut argv: Vec<*const libc::c_char> = l.argv.iter().map(|a| a.as_ptr()).collect();
            argv.push(std::ptr::null());
            let mut envp: Vec<*const libc::c_char> = l.envp.iter().map(|e| e.as_ptr()).collect();
            envp.push(std::ptr::null());
            (argv, envp, l.stderr.as_raw_fd())
        });

        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) }, 0);
        let (read_fd, write_fd) = (fds[0], fds[1]);

        let pid = unsafe { libc::fork() };
        assert!(pid >= 0, "fork failed: {}", io::Error::last_os_error());
        if pid == 0 {
            // Only async-signal-safe calls from here on.
            unsafe {
                let mut set: libc::sigset_t = std::mem::zeroed();
                libc::sigemptyset(&mut set);
                libc::sigaddset(&mut set, sig);
                libc::sigprocmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
                send(write_fd, READY, libc::getpid());

                if let Some((argv, envp, stderr_fd)) = &prepared {
                    let helper = libc::fork();
                    if helper == 0 {
                        libc::dup2(*stderr_fd, libc::STDERR_FILENO);
                        libc::execve(argv[0], argv.as_ptr(), envp.as_ptr());
                        libc::_exit(127);
                    }
                    let mut status = 0;
                    while libc::waitpid(helper, &mut status, 0) == -1
                        && *libc::__errno_location() == libc::EINTR
                    {}
                    let code = if libc::WIFEXITED(status) { libc::WEXITSTATUS(status) } else { -1 };
                    send(write_fd, EXITED, code);
                }

                let mut timeout = window;
                loop {
                    let mut info: libc::siginfo_t = std::mem::zeroed();
                    let got = libc::sigtimedwait(&set, &mut info, &timeout);
                    if got == sig {
                        send(write_fd, PAYLOAD, sigval_payload(info.si_value()));
                        timeout = grace;
                    } else if got == -1 && *libc::__errno_location() == libc::EINTR {
                        continue;
                    } else {
                        break;
                    }
                }
                libc::_exit(0);
            }
        }

        unsafe { libc::close(write_fd) };
        drop(launch);

        let mut target = Target {
            pid,
            reader: unsafe { File::from_raw_fd(read_fd) },
            helper_exit: None,
            payloads: Vec::new(),
        };
        let (kind, value) = target.next_record().expect("target never became ready");
        assert_eq!((kind, value), (READY, pid));
        target
    }

    /// Collects everything the target reported and reaps it.
    pub fn finish(mut self) -> TargetReport {
        while let Some((kind, value)) = self.next_record() {
            match kind {
                EXITED => self.helper_exit = Some(value),
                PAYLOAD => self.payloads.push(value),
                other => panic!("unexpected record kind {}", other),
            }
        }
        let mut status = 0;
        unsafe { libc::waitpid(self.pid, &mut status, 0) };

        TargetReport {
            pid: self.pid,
            helper_exit: self.helper_exit,
            payloads: self.payloads,
        }
    }

    fn next_record(&mut self) -> Option<(i32, i32)> {
        let mut buf = [0u8; 8];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => Some((
                i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
                i32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]),
            )),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => None,
            Err(e) => panic!("reading target report: {}", e),
        }
    }
}

fn send(fd: libc::c_int, kind: i32, value: i32) {
    let record = [kind, value];
    unsafe {
        libc::write(fd, record.as_ptr().cast::<libc::c_void>(), std::mem::size_of_val(&record));
    }
}

fn timespec(d: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    }
}

/// Runs the helper as the target's child with `args` and `env`.
pub fn run_under_target(
    args: &[&str],
    env: &[(&str, &str)],
    stderr: &Path,
    window: Duration,
) -> TargetReport {
    Target::spawn(Some(Launch::new(args, env, stderr)), window).finish()
}
