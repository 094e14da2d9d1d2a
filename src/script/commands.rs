//! C4 built-in command table (spec §4.4).
//!
//! Commands that only touch interpreter state (`set`, arithmetic, string
//! ops) execute synchronously. Commands that need a terminal byte, a
//! completed transfer, or another subsystem's result return a [`Suspend`]
//! describing the wait condition; the scheduler resumes the line and
//! feeds the result back through [`Host`] once it is available.

use super::interp::Interpreter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEcho {
    Echo,
    NoEcho,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suspend {
    /// `prompt`/`readline`: wait for a line (or a single char) of input.
    PromptChar { var: String, echo: InputEcho },
    PromptLine { var: String, echo: InputEcho },
    YesNo { var: String },
    AnyKey { art_file: Option<String> },
    DetectAnsi { var: String, timeout_ms: u64 },
    MorePrompt,
    Logon,
    NewUser,
    Online { var: String },
    SendFile { file_id: String, proto: Option<String> },
    ReceiveFile { name: Option<String>, proto: Option<String> },
    LoginScan,
}

/// Everything a command needs from the rest of the system. A concrete
/// implementation lives in the scheduler, wired to a real [`Line`](crate::session::Line)
/// and object store; tests use [`NullHost`].
pub trait Host {
    /// Writes to the output pipe through the terminal model; returns true
    /// if the paging threshold was just reached.
    fn print(&mut self, text: &str) -> bool;
    fn cls(&mut self);
    fn set_fgbg(&mut self, fg: u8, bg: u8);
    fn set_bold(&mut self);
    fn set_std(&mut self);
    fn set_flash(&mut self, on: bool);
    fn has_key(&self, letter: char) -> bool;
    fn doing(&mut self, text: &str);
    fn set_more_override(&mut self, on: Option<bool>);
    fn macro_value(&self, name: &str) -> Option<String>;
    fn load_script(&self, path: &str) -> Option<String>;
    fn random(&mut self, lo: i64, hi: i64) -> i64;
    fn sendmail(&mut self, user: &str, subject: &str, body: &str);
    fn sendnetmail(&mut self, addr: &str, name: &str, subject: &str, body: &str);
}

fn parse_int(s: &str) -> i64 {
    s.trim().parse().unwrap_or(0)
}

/// Executes one non-control-flow command. Returns `Some(Suspend)` when the
/// line must park; `None` means the command completed synchronously.
pub fn dispatch(interp: &mut Interpreter, host: &mut dyn Host, cmd: &str, args: &[String]) -> Option<Suspend> {
    match cmd {
        "print" => {
            let text = args.join(" ");
            if host.print(&text) {
                return Some(Suspend::MorePrompt);
            }
            None
        }
        "set" => {
            if let Some(var) = args.first() {
                interp.set_var(var, args.get(1..).map(|s| s.join(" ")).unwrap_or_default());
            }
            None
        }
        "add" | "sub" | "mul" | "div" | "mod" => {
            if args.len() < 3 {
                return None;
            }
            let a = parse_int(&args[1]);
            let b = parse_int(&args[2]);
            let result = match cmd {
                "add" => a + b,
                "sub" => a - b,
                "mul" => a * b,
                "div" => if b == 0 { 0 } else { a / b },
                "mod" => if b == 0 { 0 } else { a % b },
                _ => unreachable!(),
            };
            interp.set_var(&args[0], result.to_string());
            None
        }
        "random" => {
            if args.len() < 3 {
                return None;
            }
            let lo = parse_int(&args[1]);
            let hi = parse_int(&args[2]);
            let v = host.random(lo, hi);
            interp.set_var(&args[0], v.to_string());
            None
        }
        "strlen" => {
            if args.len() < 2 {
                return None;
            }
            interp.set_var(&args[0], args[1].chars().count().to_string());
            None
        }
        "haskey" => {
            if args.len() < 2 {
                return None;
            }
            let letter = args[1].chars().next().unwrap_or(' ');
            let v = if host.has_key(letter) { "1" } else { "0" };
            interp.set_var(&args[0], v.to_string());
            None
        }
        "detectansi" => {
            let var = args.first().cloned().unwrap_or_default();
            let timeout_ms = args.get(1).map(|s| parse_int(s) as u64).unwrap_or(3000);
            Some(Suspend::DetectAnsi { var, timeout_ms })
        }
        "cls" => {
            host.cls();
            None
        }
        "fgbg" => {
            let fg = args.first().map(|s| parse_int(s) as u8).unwrap_or(7);
            let bg = args.get(1).map(|s| parse_int(s) as u8).unwrap_or(0);
            host.set_fgbg(fg, bg);
            None
        }
        "bold" => {
            host.set_bold();
            None
        }
        "std" => {
            host.set_std();
            None
        }
        "flash" => {
            let on = args.first().map(|s| s == "1").unwrap_or(false);
            host.set_flash(on);
            None
        }
        "prompt" => {
            let var = args.first().cloned().unwrap_or_default();
            let echo = if args.iter().any(|a| a == "noecho") { InputEcho::NoEcho } else { InputEcho::Echo };
            if args.iter().any(|a| a == "line") {
                Some(Suspend::PromptLine { var, echo })
            } else {
                Some(Suspend::PromptChar { var, echo })
            }
        }
        "readline" => {
            let var = args.first().cloned().unwrap_or_default();
            let echo = if args.iter().any(|a| a == "noecho") { InputEcho::NoEcho } else { InputEcho::Echo };
            Some(Suspend::PromptLine { var, echo })
        }
        "yesno" => {
            let var = args.first().cloned().unwrap_or_default();
            Some(Suspend::YesNo { var })
        }
        "anykey" => Some(Suspend::AnyKey { art_file: args.first().cloned() }),
        "more" => {
            let on = args.first().map(|s| s == "1");
            host.set_more_override(on);
            None
        }
        "logon" => Some(Suspend::Logon),
        "newuser" => Some(Suspend::NewUser),
        "online" => {
            let var = args.first().cloned().unwrap_or_default();
            Some(Suspend::Online { var })
        }
        "doing" => {
            host.doing(&args.join(" "));
            None
        }
        "sendfile" => {
            let file_id = args.first().cloned().unwrap_or_default();
            Some(Suspend::SendFile { file_id, proto: args.get(1).cloned() })
        }
        "receivefile" => Some(Suspend::ReceiveFile {
            name: args.first().cloned(),
            proto: args.get(1).cloned(),
        }),
        "sendmail" => {
            if args.len() >= 3 {
                host.sendmail(&args[0], &args[1], &args[2..].join(" "));
            }
            None
        }
        "sendnetmail" => {
            if args.len() >= 4 {
                host.sendnetmail(&args[0], &args[1], &args[2], &args[3..].join(" "));
            }
            None
        }
        "loginscan" => Some(Suspend::LoginScan),
        _ => None,
    }
}

#[derive(Default)]
pub struct NullHost {
    pub printed: Vec<String>,
    pub scripts: std::collections::HashMap<String, String>,
    pub macros: std::collections::HashMap<String, String>,
    pub keys: Vec<char>,
}

impl Host for NullHost {
    fn print(&mut self, text: &str) -> bool {
        self.printed.push(text.to_string());
        false
    }
    fn cls(&mut self) {}
    fn set_fgbg(&mut self, _fg: u8, _bg: u8) {}
    fn set_bold(&mut self) {}
    fn set_std(&mut self) {}
    fn set_flash(&mut self, _on: bool) {}
    fn has_key(&self, letter: char) -> bool {
        self.keys.contains(&letter.to_ascii_uppercase())
    }
    fn doing(&mut self, _text: &str) {}
    fn set_more_override(&mut self, _on: Option<bool>) {}
    fn macro_value(&self, name: &str) -> Option<String> {
        self.macros.get(name).cloned()
    }
    fn load_script(&self, path: &str) -> Option<String> {
        self.scripts.get(path).cloned()
    }
    fn random(&mut self, lo: i64, hi: i64) -> i64 {
        lo.min(hi)
    }
    fn sendmail(&mut self, _user: &str, _subject: &str, _body: &str) {}
    fn sendnetmail(&mut self, _addr: &str, _name: &str, _subject: &str, _body: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::interp::Interpreter;

    #[test]
    fn arithmetic_division_by_zero_is_zero_not_an_error() {
        let mut interp = Interpreter::new("t", "");
        let mut host = NullHost::default();
        dispatch(&mut interp, &mut host, "div", &["r".into(), "5".into(), "0".into()]);
        assert_eq!(interp.get_var("r").unwrap(), "0");
    }

    #[test]
    fn haskey_reports_bound_user_keys() {
        let mut interp = Interpreter::new("t", "");
        let mut host = NullHost { keys: vec!['Z'], ..Default::default() };
        dispatch(&mut interp, &mut host, "haskey", &["r".into(), "z".into()]);
        assert_eq!(interp.get_var("r").unwrap(), "1");
    }

    #[test]
    fn prompt_line_noecho_returns_suspend() {
        let mut interp = Interpreter::new("t", "");
        let mut host = NullHost::default();
        let s = dispatch(&mut interp, &mut host, "prompt", &["pw".into(), "line".into(), "noecho".into()]);
        assert_eq!(s, Some(Suspend::PromptLine { var: "pw".into(), echo: InputEcho::NoEcho }));
    }
}
