use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use criuengine::action::ENV_SCRIPT_ACTION;
use criuengine::config::helper_path;
use criuengine::workflow;
use criuengine::{
    Action, CliOptions, EngineError, EnvSource, InvocationConfig, ProcessEnv, ScriptEvent,
};

#[derive(Parser, Debug)]
#[command(name = "criuengine")]
#[command(about = "CRIU checkpoint/restore helper", long_about = None)]
struct Args {
    /// checkpoint, restore or restorewait
    action: Option<String>,

    /// CRIU verbosity level, passed on as --verbosity=<LEVEL>
    #[arg(short = 'v', long, value_name = "LEVEL")]
    verbosity: Option<String>,

    /// CRIU log file; relative paths land in the image directory on dump
    #[arg(short = 'o', long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Checkpoint image directory
    image_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    criuengine::logging::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let env = ProcessEnv;

    let action = match args.action {
        Some(action) => action.parse::<Action>()?,
        // CRIU runs its action script without arguments.
        None => {
            let event = env
                .var(ENV_SCRIPT_ACTION)
                .ok_or(EngineError::UnknownContext)?;
            let event = ScriptEvent::parse(&event);
            match event.action() {
                Some(action) => action,
                None => {
                    log::debug!("Ignoring action-script event {}", event);
                    return Ok(ExitCode::SUCCESS);
                }
            }
        }
    };
    let opts = CliOptions {
        verbosity: args.verbosity,
        log_file: args.log_file,
        image_dir: args.image_dir,
    };

    match action {
        Action::Checkpoint => {
            // The process asking to be checkpointed is the one that ran us.
            let target = criuengine::process::parent_pid();
            let config = resolve(action, opts, &env)?;
            workflow::checkpoint(&config, target)?;
            Ok(ExitCode::SUCCESS)
        }
        Action::Restore => {
            let config = resolve(action, opts, &env)?;
            match workflow::restore(&config)? {}
        }
        Action::RestoreWait => {
            let code = workflow::restorewait(&env)?;
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
        Action::PostResume => {
            workflow::post_resume(&env)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve(action: Action, opts: CliOptions, env: &ProcessEnv) -> anyhow::Result<InvocationConfig> {
    let argv0 = std::env::args_os()
        .next()
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_default();
    let self_exe = helper_path(&argv0)?;
    Ok(InvocationConfig::resolve(action, opts, env, self_exe)?)
}
