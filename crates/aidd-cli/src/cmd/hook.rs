use aidd_core::hook::{self, HookEnv, HookInput, HookReply};
use anyhow::Context;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};

/// Read one hook event from stdin, print one JSON object, return the exit code.
pub fn run() -> i32 {
    let reply = match respond() {
        Ok(reply) => reply,
        Err(e) => HookReply::internal_error(&format!("{e:#}")),
    };
    if let Err(e) = emit(&reply) {
        eprintln!("error: {e:#}");
        return 2;
    }
    reply.exit_code
}

fn respond() -> anyhow::Result<HookReply> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("failed to read hook payload from stdin")?;

    let input = match HookInput::parse(&raw) {
        Ok(input) => input,
        Err(e) => return Ok(HookReply::fail_open(&e.to_string())),
    };
    let env = HookEnv::from_input(&input);

    panic::catch_unwind(AssertUnwindSafe(|| hook::dispatch(&input, &env))).map_err(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        anyhow::anyhow!("hook {} panicked: {detail}", input.hook_event_name)
    })
}

fn emit(reply: &HookReply) -> anyhow::Result<()> {
    if let Some(message) = &reply.stderr {
        eprintln!("{message}");
    }
    println!("{}", serde_json::to_string(&reply.output)?);
    Ok(())
}
