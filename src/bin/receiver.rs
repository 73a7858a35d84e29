use std::io::{self, Write};
use std::{mem, process, ptr, thread};

use sendrecv::config::{self, Endpoint, ReceiverConfig};
use sendrecv::{Receiver, Result, ShutdownHandle, error, info, warn};

fn main() {
    config::init_logging();

    if let Err(err) = run() {
        error!("{err}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let endpoint = Endpoint::from_env()?;

    let receiver = Receiver::bind(&endpoint.addr, endpoint.port, ReceiverConfig::default())?;
    watch_signals(receiver.shutdown_handle())?;

    receiver.run(|data| {
        let mut stdout = io::stdout().lock();
        if let Err(err) = stdout.write_all(data).and_then(|_| stdout.flush()) {
            warn!("failed to write to stdout: {err}");
        }
    })
}

/// Routes `SIGINT`/`SIGTERM` to a dedicated thread: the first one shuts the
/// listener down, a second one exits immediately.
///
/// Must run before any other thread is spawned so they all inherit the
/// blocked signal mask.
fn watch_signals(handle: ShutdownHandle) -> Result<()> {
    let mut set: libc::sigset_t = unsafe { mem::zeroed() };

    unsafe {
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::sigaddset(&mut set, libc::SIGTERM);
    }

    let ret = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()) };
    if ret != 0 {
        return Err(io::Error::from_raw_os_error(ret).into());
    }

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            let mut shutting_down = false;

            loop {
                let mut sig: libc::c_int = 0;
                if unsafe { libc::sigwait(&set, &mut sig) } != 0 {
                    continue;
                }

                if shutting_down {
                    warn!("received signal {sig} again, exiting");
                    process::exit(130);
                }

                info!("received signal {sig}, no longer accepting connections");
                shutting_down = true;

                if let Err(err) = handle.shutdown() {
                    error!("{err}");
                    process::exit(1);
                }
            }
        })?;

    Ok(())
}
