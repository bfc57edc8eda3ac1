use gust_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Above this share of the machine's CPU, the load generator itself may be the bottleneck.
const HIGH_CPU_USAGE_PERCENT: f32 = 80.0;

/// Monitor the resource usage of the load generator and report high usage.
///
/// Note that this won't stop the test proceeding, it will just log a warning to let the user know
/// that request timings might be skewed because the load generator is saturated.
///
/// The CPU usage for the process is collected every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] and checked.
pub(crate) fn start_monitor(mut stop_listener: DelegatedShutdownListener) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu_usage();
            let cpu_count = sys.cpus().len().max(1);
            let mut warned = false;

            loop {
                if stop_listener.should_shutdown() {
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[this_process_pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                let Some(process) = sys.process(this_process_pid) else {
                    log::debug!("Could not read process info, stopping the resource monitor");
                    break;
                };

                let usage = (process.cpu_usage() / (cpu_count * 100) as f32) * 100.0;
                if usage > HIGH_CPU_USAGE_PERCENT {
                    if !warned {
                        log::warn!("High CPU usage detected. The load generator is using {:.2}% of the CPU, with {} available cores", usage, cpu_count);
                        warned = true;
                    }
                } else {
                    warned = false;
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
        })?;

    Ok(())
}
