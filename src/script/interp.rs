//! C4 control-flow engine: labels, nestable if/for/while blocks, and the
//! subscript call stack (spec §4.4).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::commands::{self, Host, Suspend};
use super::lexer::{expand, strip_comment, tokenize};

pub const MAX_CALL_DEPTH: usize = 8;
pub const MAX_IF_NESTING: usize = 16;

#[derive(Debug)]
pub enum ScriptError {
    Syntax(String),
    UndefinedLabel(String),
    StackOverflow,
    IfNestingTooDeep,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Syntax(s) => write!(f, "syntax error: {s}"),
            ScriptError::UndefinedLabel(l) => write!(f, "undefined label: {l}"),
            ScriptError::StackOverflow => write!(f, "script stack overflow"),
            ScriptError::IfNestingTooDeep => write!(f, "if nesting too deep"),
        }
    }
}
impl std::error::Error for ScriptError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    For,
    While,
}

#[derive(Debug, Clone)]
#[allow(dead_code)]
struct LoopFrame {
    kind: LoopKind,
    var: String,
    to: i64,
    step: i64,
    /// Index of the opening `for`/`while` line (continue target for while,
    /// jump-back target for for).
    start_pc: usize,
    /// Index of the closing `endfor`/`endwhile` line.
    end_pc: usize,
}

#[derive(Debug)]
pub enum StepResult {
    Continue,
    Suspend(Suspend),
    Finished,
}

struct Frame {
    path: String,
    lines: Arc<Vec<String>>,
    labels: Arc<HashMap<String, usize>>,
    pc: usize,
    loops: Vec<LoopFrame>,
}

/// A running script: the variable store (shared across the whole call
/// stack, spec §4.4 "no lexical scope") plus the stack of loaded scripts.
pub struct Interpreter {
    vars: HashMap<String, String>,
    frames: Vec<Frame>,
}

fn word_eq(token: &str, word: &str) -> bool {
    token.eq_ignore_ascii_case(word)
}

fn is_if(t: &[String]) -> bool {
    t.first().is_some_and(|s| word_eq(s, "if"))
}
fn is_else(t: &[String]) -> bool {
    t.first().is_some_and(|s| word_eq(s, "else"))
}
fn is_end_if(t: &[String]) -> bool {
    (t.len() == 1 && word_eq(&t[0], "endif"))
        || (t.len() == 2 && word_eq(&t[0], "end") && word_eq(&t[1], "if"))
}
fn is_for(t: &[String]) -> bool {
    t.first().is_some_and(|s| word_eq(s, "for"))
}
fn is_endfor(t: &[String]) -> bool {
    t.first().is_some_and(|s| word_eq(s, "endfor"))
}
fn is_while(t: &[String]) -> bool {
    t.first().is_some_and(|s| word_eq(s, "while"))
}
fn is_endwhile(t: &[String]) -> bool {
    t.first().is_some_and(|s| word_eq(s, "endwhile"))
}

/// Scans forward from `from` (exclusive) for the line that closes the
/// block opened there, tracking nesting of same-kind blocks. Optionally
/// records the first same-depth `else`.
fn skip_to_matching(
    lines: &[String],
    from: usize,
    is_open: impl Fn(&[String]) -> bool,
    is_close: impl Fn(&[String]) -> bool,
    is_mid: Option<impl Fn(&[String]) -> bool>,
) -> Result<(usize, Option<usize>), ScriptError> {
    let mut depth = 0u32;
    let mut mid_idx = None;
    let mut i = from + 1;
    while i < lines.len() {
        let toks = tokenize(strip_comment(&lines[i]));
        if is_open(&toks) {
            depth += 1;
            if depth as usize > MAX_IF_NESTING {
                return Err(ScriptError::IfNestingTooDeep);
            }
        } else if is_close(&toks) {
            if depth == 0 {
                return Ok((i, mid_idx));
            }
            depth -= 1;
        } else if depth == 0 {
            if let Some(is_mid) = &is_mid {
                if is_mid(&toks) && mid_idx.is_none() {
                    mid_idx = Some(i);
                }
            }
        }
        i += 1;
    }
    Err(ScriptError::Syntax("unterminated block".to_string()))
}

fn parse_int(s: &str) -> i64 {
    s.trim().parse().unwrap_or(0)
}

fn eval_condition(tokens: &[String]) -> bool {
    // Split on && / || keeping operators, evaluate comparisons left to
    // right with equal precedence (spec §4.4).
    let mut result: Option<bool> = None;
    let mut pending_op: Option<&str> = None;
    let mut i = 0;
    while i < tokens.len() {
        if word_eq(&tokens[i], "&&") {
            pending_op = Some("&&");
            i += 1;
            continue;
        }
        if word_eq(&tokens[i], "||") {
            pending_op = Some("||");
            i += 1;
            continue;
        }
        if i + 2 >= tokens.len() {
            break;
        }
        let lhs = &tokens[i];
        let op = tokens[i + 1].as_str();
        let rhs = &tokens[i + 2];
        let v = eval_comparison(lhs, op, rhs);
        result = Some(match (result, pending_op) {
            (None, _) => v,
            (Some(r), Some("&&")) => r && v,
            (Some(r), Some("||")) => r || v,
            (Some(r), _) => r,
        });
        pending_op = None;
        i += 3;
    }
    result.unwrap_or(false)
}

fn eval_comparison(lhs: &str, op: &str, rhs: &str) -> bool {
    match op {
        "==" => lhs == rhs,
        "!=" => lhs != rhs,
        ">" | "<" | ">=" | "<=" => {
            let (a, b) = (
                lhs.trim().parse::<f64>().unwrap_or(0.0),
                rhs.trim().parse::<f64>().unwrap_or(0.0),
            );
            match op {
                ">" => a > b,
                "<" => a < b,
                ">=" => a >= b,
                "<=" => a <= b,
                _ => unreachable!(),
            }
        }
        _ => false,
    }
}

fn build_labels(lines: &[String]) -> HashMap<String, usize> {
    let mut labels = HashMap::new();
    for (i, line) in lines.iter().enumerate() {
        let trimmed = strip_comment(line).trim();
        if let Some(name) = trimmed.strip_suffix(':') {
            if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                labels.insert(name.to_ascii_lowercase(), i);
            }
        }
    }
    labels
}

impl Interpreter {
    pub fn new(entry_path: &str, source: &str) -> Self {
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        let labels = build_labels(&lines);
        let frame = Frame {
            path: entry_path.to_string(),
            labels: Arc::new(labels),
            lines: Arc::new(lines),
            pc: 0,
            loops: Vec::new(),
        };
        Interpreter {
            vars: HashMap::new(),
            frames: vec![frame],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_path(&self) -> Option<&str> {
        self.frames.last().map(|f| f.path.as_str())
    }

    fn lookup(&self, host: &dyn Host, name: &str) -> Option<String> {
        if let Some(v) = self.vars.get(name) {
            return Some(v.clone());
        }
        host.macro_value(name)
    }

    fn expand_str(&self, host: &dyn Host, s: &str) -> String {
        expand(s, |name| self.lookup(host, name))
    }

    fn expand_tokens(&self, host: &dyn Host, tokens: &[String]) -> Vec<String> {
        tokens.iter().map(|t| self.expand_str(host, t)).collect()
    }

    pub fn push_script(&mut self, path: &str, source: &str) -> Result<(), ScriptError> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(ScriptError::StackOverflow);
        }
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        let labels = build_labels(&lines);
        self.frames.push(Frame {
            path: path.to_string(),
            labels: Arc::new(labels),
            lines: Arc::new(lines),
            pc: 0,
            loops: Vec::new(),
        });
        Ok(())
    }

    pub fn set_var(&mut self, name: &str, value: String) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn get_var(&self, name: &str) -> Option<&String> {
        self.vars.get(name)
    }

    /// Runs statements until a command suspends, the script requests a
    /// subscript load (caller must then call [`push_script`] and call
    /// `step` again), or the whole call stack unwinds.
    pub fn step(&mut self, host: &mut dyn Host) -> Result<StepResult, ScriptError> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(StepResult::Finished);
            };
            if frame.pc >= frame.lines.len() {
                self.frames.pop();
                if self.frames.is_empty() {
                    return Ok(StepResult::Finished);
                }
                continue;
            }
            let lines = Arc::clone(&frame.lines);
            let labels = Arc::clone(&frame.labels);
            let pc = frame.pc;
            let raw = strip_comment(&lines[pc]).trim();
            if raw.is_empty() || raw.ends_with(':') {
                self.frames.last_mut().unwrap().pc = pc + 1;
                continue;
            }
            let tokens = tokenize(raw);
            let cmd = tokens[0].to_ascii_lowercase();

            match cmd.as_str() {
                "if" => {
                    let then_idx = tokens.iter().position(|t| word_eq(t, "then")).unwrap_or(tokens.len());
                    let cond_tokens = self.expand_tokens(host, &tokens[1..then_idx]);
                    let cond = eval_condition(&cond_tokens);
                    let (endif, else_idx) = skip_to_matching(
                        &lines,
                        pc,
                        is_if,
                        is_end_if,
                        Some(is_else),
                    )?;
                    let frame = self.frames.last_mut().unwrap();
                    frame.pc = if cond { pc + 1 } else { else_idx.map(|e| e + 1).unwrap_or(endif + 1) };
                }
                "else" => {
                    let (endif, _) = skip_to_matching(&lines, pc, is_if, is_end_if, Some(is_else))?;
                    self.frames.last_mut().unwrap().pc = endif + 1;
                }
                "endif" | "end" => {
                    self.frames.last_mut().unwrap().pc = pc + 1;
                }
                "for" => {
                    self.exec_for(host, &lines, pc, &tokens)?;
                }
                "endfor" => {
                    self.exec_endfor(pc)?;
                }
                "while" => {
                    self.exec_while(host, &lines, pc, &tokens)?;
                }
                "endwhile" => {
                    let frame = self.frames.last_mut().unwrap();
                    let top = frame.loops.last().ok_or_else(|| ScriptError::Syntax("endwhile without while".into()))?;
                    frame.pc = top.start_pc;
                }
                "break" => {
                    let frame = self.frames.last_mut().unwrap();
                    let popped = frame.loops.pop().ok_or_else(|| ScriptError::Syntax("break outside loop".into()))?;
                    frame.pc = popped.end_pc + 1;
                }
                "continue" => {
                    let frame = self.frames.last_mut().unwrap();
                    let top = frame.loops.last().ok_or_else(|| ScriptError::Syntax("continue outside loop".into()))?;
                    frame.pc = match top.kind {
                        LoopKind::For => top.end_pc,
                        LoopKind::While => top.start_pc,
                    };
                }
                "goto" => {
                    let target = tokens.get(1).map(|s| s.to_ascii_lowercase()).unwrap_or_default();
                    let idx = *labels.get(&target).ok_or_else(|| ScriptError::UndefinedLabel(target.clone()))?;
                    self.frames.last_mut().unwrap().pc = idx;
                }
                "script" => {
                    self.frames.last_mut().unwrap().pc = pc + 1;
                    let path = tokens.get(1).cloned().unwrap_or_default();
                    let path = self.expand_str(host, &path);
                    let source = host.load_script(&path).ok_or_else(|| ScriptError::Syntax(format!("script not found: {path}")))?;
                    self.push_script(&path, &source)?;
                }
                "return" => {
                    self.frames.pop();
                    if self.frames.is_empty() {
                        return Ok(StepResult::Finished);
                    }
                }
                "stop" => {
                    self.frames.clear();
                    return Ok(StepResult::Finished);
                }
                _ => {
                    self.frames.last_mut().unwrap().pc = pc + 1;
                    let args = self.expand_tokens(host, &tokens[1..]);
                    let outcome = commands::dispatch(self, host, &cmd, &args);
                    if let Some(suspend) = outcome {
                        return Ok(StepResult::Suspend(suspend));
                    }
                    return Ok(StepResult::Continue);
                }
            }
        }
    }

    fn exec_for(&mut self, host: &mut dyn Host, lines: &[String], pc: usize, tokens: &[String]) -> Result<(), ScriptError> {
        // for v = a to b [step s]
        if tokens.len() < 6 || !word_eq(&tokens[2], "=") || !word_eq(&tokens[4], "to") {
            return Err(ScriptError::Syntax("malformed for".into()));
        }
        let var = tokens[1].clone();
        let from = parse_int(&self.expand_str(host, &tokens[3]));
        let to = parse_int(&self.expand_str(host, &tokens[5]));
        let step = if tokens.len() >= 8 && word_eq(&tokens[6], "step") {
            parse_int(&self.expand_str(host, &tokens[7]))
        } else {
            1
        };
        let (endfor, _) = skip_to_matching(lines, pc, is_for, is_endfor, None::<fn(&[String]) -> bool>)?;
        let enters = if step >= 0 { from <= to } else { from >= to };
        let frame = self.frames.last_mut().unwrap();
        if enters {
            self.vars.insert(var.clone(), from.to_string());
            frame.loops.push(LoopFrame { kind: LoopKind::For, var, to, step, start_pc: pc + 1, end_pc: endfor });
            frame.pc = pc + 1;
        } else {
            frame.pc = endfor + 1;
        }
        Ok(())
    }

    fn exec_endfor(&mut self, _pc: usize) -> Result<(), ScriptError> {
        let frame = self.frames.last_mut().unwrap();
        let top = frame.loops.last().cloned().ok_or_else(|| ScriptError::Syntax("endfor without for".into()))?;
        let current = self.vars.get(&top.var).map(|v| parse_int(v)).unwrap_or(0);
        let next = current + top.step;
        let still_in_range = if top.step >= 0 { next <= top.to } else { next >= top.to };
        let frame = self.frames.last_mut().unwrap();
        if still_in_range {
            self.vars.insert(top.var.clone(), next.to_string());
            frame.pc = top.start_pc;
        } else {
            frame.loops.pop();
            frame.pc = top.end_pc + 1;
        }
        Ok(())
    }

    fn exec_while(&mut self, host: &mut dyn Host, lines: &[String], pc: usize, tokens: &[String]) -> Result<(), ScriptError> {
        let already_running = self
            .frames
            .last()
            .unwrap()
            .loops
            .last()
            .is_some_and(|l| l.kind == LoopKind::While && l.start_pc == pc);
        let cond_tokens = self.expand_tokens(host, &tokens[1..]);
        let cond = eval_condition(&cond_tokens);
        let (endwhile, _) = skip_to_matching(lines, pc, is_while, is_endwhile, None::<fn(&[String]) -> bool>)?;
        let frame = self.frames.last_mut().unwrap();
        if cond {
            if !already_running {
                frame.loops.push(LoopFrame {
                    kind: LoopKind::While,
                    var: String::new(),
                    to: 0,
                    step: 0,
                    start_pc: pc,
                    end_pc: endwhile,
                });
            }
            frame.pc = pc + 1;
        } else {
            if already_running {
                frame.loops.pop();
            }
            frame.pc = endwhile + 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::commands::NullHost;

    fn run_to_completion(src: &str) -> Vec<String> {
        let mut host = NullHost::default();
        let mut interp = Interpreter::new("main", src);
        loop {
            match interp.step(&mut host).unwrap() {
                StepResult::Continue => continue,
                StepResult::Suspend(_) => break,
                StepResult::Finished => break,
            }
        }
        host.printed
    }

    #[test]
    fn if_else_picks_correct_branch() {
        let printed = run_to_completion("set x 1\nif %{x} == 1 then\nprint yes\nelse\nprint no\nend if\n");
        assert_eq!(printed, vec!["yes"]);
    }

    #[test]
    fn for_loop_accumulates() {
        let printed = run_to_completion("set acc 0\nfor i = 1 to 3\nadd acc acc i\nendfor\nprint %{acc}\n");
        assert_eq!(printed, vec!["6"]);
    }

    #[test]
    fn for_loop_with_negative_step_counts_down() {
        let printed = run_to_completion("for i = 3 to 1 step -1\nprint %{i}\nendfor\n");
        assert_eq!(printed, vec!["3", "2", "1"]);
    }

    #[test]
    fn while_loop_with_break_and_continue() {
        let printed = run_to_completion(
            "set i 0\nwhile %{i} < 5\nadd i i 1\nif %{i} == 2 then\ncontinue\nend if\nif %{i} == 4 then\nbreak\nend if\nprint %{i}\nendwhile\n",
        );
        assert_eq!(printed, vec!["1", "3"]);
    }

    #[test]
    fn goto_jumps_to_label() {
        let printed = run_to_completion("goto skip\nprint never\nskip:\nprint here\n");
        assert_eq!(printed, vec!["here"]);
    }

    #[test]
    fn subscript_call_returns_to_caller() {
        let mut host = NullHost::default();
        host.scripts.insert("sub".to_string(), "print in-sub\nreturn\n".to_string());
        let mut interp = Interpreter::new("main", "print before\nscript sub\nprint after\n");
        loop {
            match interp.step(&mut host).unwrap() {
                StepResult::Continue => continue,
                StepResult::Finished => break,
                StepResult::Suspend(_) => break,
            }
        }
        assert_eq!(host.printed, vec!["before", "in-sub", "after"]);
    }
}
