//! Stand-in child process for the runner's integration tests.
//!
//! Flags are applied left to right, each taking one value:
//! `--stdout-bytes N`, `--stderr-bytes N`, `--sleep-ms N`, `--spawn-child-sleep-ms N`,
//! `--exit-code N`.

use std::{
    env,
    io::{self, Read, Write},
    process, thread,
    time::Duration,
};

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    process::exit(2);
}

fn flood(mut out: impl Write, count: u64, byte: u8) {
    if io::copy(&mut io::repeat(byte).take(count), &mut out).is_err() || out.flush().is_err() {
        fail("write failed");
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    for pair in args.chunks(2) {
        let [flag, value] = pair else {
            fail(&format!("missing value for {}", pair[0]));
        };
        let Ok(n) = value.parse::<u64>() else {
            fail(&format!("invalid number for {flag}: {value}"));
        };
        match flag.as_str() {
            "--stdout-bytes" => flood(io::stdout().lock(), n, b'a'),
            "--stderr-bytes" => flood(io::stderr().lock(), n, b'b'),
            "--sleep-ms" => thread::sleep(Duration::from_millis(n)),
            "--spawn-child-sleep-ms" => {
                let exe = env::current_exe().unwrap_or_else(|err| fail(&err.to_string()));
                // Left running on purpose; the runner must take it down with us.
                if let Err(err) = process::Command::new(exe)
                    .args(["--sleep-ms", value])
                    .spawn()
                {
                    fail(&format!("failed to spawn child: {err}"));
                }
            }
            "--exit-code" => process::exit(n as i32),
            other => fail(&format!("unknown argument: {other}")),
        }
    }
}
