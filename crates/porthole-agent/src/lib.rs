mod manager;
mod process;
mod stream;

pub use manager::{AgentSettings, ProcessManager, SessionDirectory};
pub use process::AgentProcess;
pub use stream::{
    build_command, control_response_line, user_message_line, CliEvent, ControlRequestBody,
    LaunchSpec, QUESTION_TOOL,
};
