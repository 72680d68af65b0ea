//! AppleScript and shell fragment builders for driving Terminal.app.
//!
//! Everything here is pure string assembly so the exact bytes handed to
//! `osascript` can be asserted in tests without a Mac.

use ferry_protocol::PromptAction;

/// Escapes a string for embedding inside an AppleScript double-quoted
/// literal.
pub fn escape_applescript(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escapes a string for embedding inside a double-quoted shell word that
/// itself lives inside an AppleScript `do script` literal.
pub fn escape_shell(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`")
}

/// Shell command that launches a fresh agent session in `working_dir`.
pub fn launch_command(
    agent_command: &str,
    working_dir: &str,
    session_id: &str,
    system_prompt: &str,
) -> String {
    format!(
        "cd \"{}\" && {} --session-id {} --append-system-prompt \"{}\"",
        escape_shell(working_dir),
        agent_command,
        session_id,
        escape_shell(system_prompt),
    )
}

/// Shell command that resumes an existing agent session in `working_dir`.
pub fn resume_command(agent_command: &str, working_dir: &str, session_id: &str) -> String {
    format!(
        "cd \"{}\" && {} --resume {}",
        escape_shell(working_dir),
        agent_command,
        session_id,
    )
}

/// Script that opens a new Terminal window running `shell_command` and
/// prints the window id on stdout.
pub fn open_window_script(shell_command: &str) -> String {
    format!(
        "tell application \"Terminal\"\n\
         \tactivate\n\
         \tdo script \"{}\"\n\
         \tset windowId to id of window 1\n\
         \treturn windowId\n\
         end tell\n",
        escape_applescript(shell_command),
    )
}

/// Script that returns `true`/`false` for whether the window still exists.
pub fn probe_window_script(window_id: &str) -> String {
    format!(
        "tell application \"Terminal\"\n\
         \ttry\n\
         \t\tget window id {window_id}\n\
         \t\treturn true\n\
         \ton error\n\
         \t\treturn false\n\
         \tend try\n\
         end tell\n",
    )
}

/// Script that delivers `message` into the window through the clipboard.
///
/// Typing long multi-line text with `keystroke` is unreliable; pasting is
/// what the interactive prompt tolerates.
pub fn paste_message_script(window_id: &str, message: &str) -> String {
    format!(
        "set the clipboard to \"{}\"\n\
         tell application \"Terminal\"\n\
         \tactivate\n\
         \tset frontmost of window id {window_id} to true\n\
         end tell\n\
         delay 0.3\n\
         tell application \"System Events\"\n\
         \ttell process \"Terminal\"\n\
         \t\tkeystroke \"v\" using command down\n\
         \t\tdelay 0.2\n\
         \t\tkeystroke return using command down\n\
         \tend tell\n\
         end tell\n",
        escape_applescript(message),
    )
}

/// One System Events line per prompt action.
pub fn action_line(action: PromptAction) -> &'static str {
    match action {
        PromptAction::MoveForward => "key code 125",
        PromptAction::Toggle => "keystroke \" \"",
        PromptAction::Confirm => "keystroke return",
    }
}

/// Script that replays `actions` against the window's interactive prompt,
/// with a settle delay between keystrokes.
pub fn replay_actions_script(window_id: &str, actions: &[PromptAction]) -> String {
    let mut lines = Vec::with_capacity(actions.len() * 2);
    for (index, action) in actions.iter().enumerate() {
        if index > 0 {
            lines.push("delay 0.1".to_string());
        }
        lines.push(action_line(*action).to_string());
    }
    let body = lines
        .iter()
        .map(|line| format!("\t\t{line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "tell application \"Terminal\"\n\
         \tactivate\n\
         \tset frontmost of window id {window_id} to true\n\
         end tell\n\
         delay 0.3\n\
         tell application \"System Events\"\n\
         \ttell process \"Terminal\"\n\
         {body}\n\
         \tend tell\n\
         end tell\n",
    )
}
