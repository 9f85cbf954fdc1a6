//! Macro syntax
//!
//! A macro is a chain of calls separated by `.`:
//!
//! ```text
//! key(a).wait(100).repeat(3, key(b))
//! modify(Control_L, key(c))
//! hold(key(space))
//! ```
//!
//! The shorthand `Control_L + Shift_L + a` holds every symbol but the last
//! while tapping the last one. Whitespace is insignificant.

use std::fmt;

use crate::error::MacroParseError;
use crate::input_event::{EV_ABS, EV_KEY, EV_REL, EV_SYN};
use crate::keys::symbol_to_code;

/// One step of a macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroTask {
    /// Press, pause, release, pause.
    Key(u16),
    KeyDown(u16),
    KeyUp(u16),
    /// Pause in milliseconds.
    Wait(u64),
    Repeat { count: u32, body: Macro },
    /// Keep `modifier` pressed while `body` runs.
    Modify { modifier: u16, body: Macro },
    /// Keep the key pressed until the trigger is released.
    HoldKey(u16),
    /// Repeat the body until the trigger is released, or just wait for the
    /// release when there is no body.
    Hold(Option<Macro>),
    Event {
        event_type: u16,
        code: u16,
        value: i32,
    },
}

/// A parsed macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    source: String,
    tasks: Vec<MacroTask>,
}

impl Macro {
    pub fn parse(code: &str) -> Result<Self, MacroParseError> {
        let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(MacroParseError::Empty);
        }

        let tasks = if !compact.contains('(') && compact.contains('+') {
            parse_plus_shorthand(&compact)?
        } else {
            let mut parser = Parser::new(&compact);
            let tasks = parser.parse_chain()?;
            if parser.pos != compact.len() {
                return Err(MacroParseError::Syntax {
                    position: parser.pos,
                    message: format!("unexpected {:?}", &compact[parser.pos..]),
                });
            }
            tasks
        };

        Ok(Self {
            source: compact,
            tasks,
        })
    }

    pub fn tasks(&self) -> &[MacroTask] {
        &self.tasks
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the macro reacts to the trigger being released.
    pub fn holds(&self) -> bool {
        self.tasks.iter().any(|task| match task {
            MacroTask::Hold(_) | MacroTask::HoldKey(_) => true,
            MacroTask::Repeat { body, .. } | MacroTask::Modify { body, .. } => body.holds(),
            _ => false,
        })
    }
}

impl fmt::Display for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Whether an output symbol should be parsed as a macro rather than a key.
pub fn is_macro(output: &str) -> bool {
    let output = output.trim();
    (output.contains('(') && output.contains(')')) || output.contains('+')
}

fn parse_plus_shorthand(compact: &str) -> Result<Vec<MacroTask>, MacroParseError> {
    let symbols: Vec<&str> = compact.split('+').collect();
    if symbols.iter().any(|s| s.is_empty()) {
        return Err(MacroParseError::Syntax {
            position: 0,
            message: format!("dangling '+' in {:?}", compact),
        });
    }

    let codes = symbols
        .iter()
        .map(|s| resolve_symbol(s))
        .collect::<Result<Vec<_>, _>>()?;

    let (last, held) = match codes.split_last() {
        Some(split) => split,
        None => return Err(MacroParseError::Empty),
    };

    let mut task = MacroTask::Key(*last);
    for modifier in held.iter().rev() {
        task = MacroTask::Modify {
            modifier: *modifier,
            body: Macro {
                source: String::new(),
                tasks: vec![task],
            },
        };
    }
    Ok(vec![task])
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn parse_chain(&mut self) -> Result<Vec<MacroTask>, MacroParseError> {
        let mut tasks = vec![self.parse_call()?];
        while self.peek() == Some('.') {
            self.pos += 1;
            tasks.push(self.parse_call()?);
        }
        Ok(tasks)
    }

    fn parse_call(&mut self) -> Result<MacroTask, MacroParseError> {
        let input = self.input;
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let name = &input[start..self.pos];
        if name.is_empty() {
            return Err(MacroParseError::Syntax {
                position: self.pos,
                message: "expected a function name".to_string(),
            });
        }
        if self.peek() != Some('(') {
            return Err(MacroParseError::Syntax {
                position: self.pos,
                message: format!("expected '(' after {}", name),
            });
        }
        self.pos += 1;

        let args = self.parse_arguments()?;
        build_task(name, &args)
    }

    /// Split the argument list at top level commas and consume the closing
    /// parenthesis.
    fn parse_arguments(&mut self) -> Result<Vec<&'a str>, MacroParseError> {
        let input = self.input;
        let mut args = Vec::new();
        let mut depth = 0usize;
        let mut start = self.pos;

        loop {
            let c = self.peek().ok_or_else(|| MacroParseError::Syntax {
                position: self.pos,
                message: "unclosed parenthesis".to_string(),
            })?;
            match c {
                '(' => depth += 1,
                ')' if depth == 0 => {
                    let last = &input[start..self.pos];
                    if !last.is_empty() || !args.is_empty() {
                        args.push(last);
                    }
                    self.pos += 1;
                    return Ok(args);
                }
                ')' => depth -= 1,
                ',' if depth == 0 => {
                    args.push(&input[start..self.pos]);
                    start = self.pos + 1;
                }
                _ => {}
            }
            self.pos += c.len_utf8();
        }
    }
}

fn build_task(name: &str, args: &[&str]) -> Result<MacroTask, MacroParseError> {
    let arity = |expected: &[usize]| -> Result<(), MacroParseError> {
        if expected.contains(&args.len()) {
            Ok(())
        } else {
            Err(MacroParseError::Arguments {
                function: name.to_string(),
                message: format!("takes {:?} arguments, got {}", expected, args.len()),
            })
        }
    };

    match name {
        "key" | "k" => {
            arity(&[1])?;
            Ok(MacroTask::Key(resolve_symbol(args[0])?))
        }
        "key_down" => {
            arity(&[1])?;
            Ok(MacroTask::KeyDown(resolve_symbol(args[0])?))
        }
        "key_up" => {
            arity(&[1])?;
            Ok(MacroTask::KeyUp(resolve_symbol(args[0])?))
        }
        "wait" | "w" => {
            arity(&[1])?;
            Ok(MacroTask::Wait(parse_number(name, args[0])?))
        }
        "repeat" | "r" => {
            arity(&[2])?;
            Ok(MacroTask::Repeat {
                count: parse_number(name, args[0])?,
                body: Macro::parse(args[1])?,
            })
        }
        "modify" | "m" => {
            arity(&[2])?;
            Ok(MacroTask::Modify {
                modifier: resolve_symbol(args[0])?,
                body: Macro::parse(args[1])?,
            })
        }
        "hold" | "h" => {
            arity(&[0, 1])?;
            match args.first() {
                None => Ok(MacroTask::Hold(None)),
                Some(arg) if arg.contains('(') => Ok(MacroTask::Hold(Some(Macro::parse(arg)?))),
                Some(arg) => Ok(MacroTask::HoldKey(resolve_symbol(arg)?)),
            }
        }
        "event" | "e" => {
            arity(&[3])?;
            Ok(MacroTask::Event {
                event_type: parse_event_type(args[0])?,
                code: parse_number(name, args[1])?,
                value: parse_number(name, args[2])?,
            })
        }
        unknown => Err(MacroParseError::UnknownFunction(unknown.to_string())),
    }
}

fn resolve_symbol(symbol: &str) -> Result<u16, MacroParseError> {
    symbol_to_code(symbol).ok_or_else(|| MacroParseError::UnknownSymbol(symbol.to_string()))
}

fn parse_number<T: std::str::FromStr>(function: &str, arg: &str) -> Result<T, MacroParseError> {
    arg.parse().map_err(|_| MacroParseError::Arguments {
        function: function.to_string(),
        message: format!("expected a number, got {:?}", arg),
    })
}

fn parse_event_type(arg: &str) -> Result<u16, MacroParseError> {
    match arg.to_uppercase().as_str() {
        "EV_SYN" => Ok(EV_SYN),
        "EV_KEY" => Ok(EV_KEY),
        "EV_REL" => Ok(EV_REL),
        "EV_ABS" => Ok(EV_ABS),
        _ => parse_number("event", arg),
    }
}
