//! The Mica virtual machine.
//!
//! The VM is a **stack machine**: it fetches one opcode at a time from the
//! current call frame's instruction stream, decodes its operands, and
//! executes it against a flat operand stack.
//!
//! # Execution model
//!
//! - The operand stack is a fixed 2048-slot array shared across all call
//!   frames; `sp` points one past the top.  Pushing past the capacity is a
//!   fatal [`RuntimeError::StackOverflow`].
//! - Each [`Frame`] records the function being executed, its instruction
//!   pointer, and its `base_pointer` — the stack index where the frame's
//!   arguments and locals begin.
//! - `OpCall` pushes a frame with `base_pointer = sp - argc` and reserves
//!   the function's local slots by setting `sp = base_pointer + num_locals`.
//!   A return pops the frame, rewinds `sp` to `base_pointer - 1` (dropping
//!   the callee and its arguments), and pushes the result.
//! - Globals live in a fixed 65,536-slot table indexed by the compiler's
//!   global indices.  A table can be carried across runs (see
//!   [`Vm::with_globals`]) so a REPL keeps its bindings.
//!
//! Popped values stay in their stack slot until overwritten, which is what
//! makes [`Vm::last_popped`] work: after a program's final implicit
//! `OpPop`, the slot just above the stack pointer holds the program's
//! result.
//!
//! Every error aborts the run; no instruction is retried.

use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::{self, Op};
use crate::compiler::Bytecode;
use crate::value::{Function, HashKey, HashPair, Value};

/// Operand stack capacity, in values.
pub const STACK_SIZE: usize = 2048;
/// Globals table capacity; global indices are 16-bit.
pub const GLOBALS_SIZE: usize = 65536;
/// Call stack capacity, in frames.
pub const MAX_FRAMES: usize = 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Runtime errors
// ─────────────────────────────────────────────────────────────────────────────

/// A fatal error raised while executing bytecode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,
    #[error("call stack exceeded {MAX_FRAMES} frames")]
    FrameOverflow,
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("unsupported types for binary operation: {left} {op} {right}")]
    UnsupportedBinary {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),
    #[error("index operator not supported on {0}")]
    IndexNotSupported(&'static str),
    #[error("unusable as hash key: {0}")]
    UnhashableKey(&'static str),
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongArity { expected: usize, got: usize },
    #[error("cannot call value of type {0}")]
    NotCallable(&'static str),
    #[error("division by zero")]
    DivisionByZero,
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame
// ─────────────────────────────────────────────────────────────────────────────

/// One active call: the function being executed, the instruction pointer,
/// and where on the operand stack the frame's slots begin.
struct Frame {
    func: Rc<Function>,
    /// Offset of the next unread byte in `func.instructions`.
    ip: usize,
    /// Stack index of local slot 0.  Arguments occupy the first
    /// `num_parameters` slots, remaining locals follow.
    base_pointer: usize,
}

impl Frame {
    fn new(func: Rc<Function>, base_pointer: usize) -> Self {
        Frame {
            func,
            ip: 0,
            base_pointer,
        }
    }

    #[inline]
    fn instructions(&self) -> &[u8] {
        &self.func.instructions
    }

    /// Fetch one byte and advance the instruction pointer.
    #[inline]
    fn read_u8(&mut self) -> u8 {
        let byte = self.func.instructions[self.ip];
        self.ip += 1;
        byte
    }

    /// Fetch a big-endian u16 operand and advance the instruction pointer.
    #[inline]
    fn read_u16(&mut self) -> u16 {
        let value = bytecode::read_u16(&self.func.instructions, self.ip);
        self.ip += 2;
        value
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vm
// ─────────────────────────────────────────────────────────────────────────────

/// The Mica virtual machine.
///
/// Build one from a compiled [`Bytecode`] bundle and call [`Vm::run`].
pub struct Vm {
    constants: Vec<Value>,
    /// The operand stack.  `stack[sp]` is the first free slot.
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    /// Call frames, innermost last.  Frame 0 wraps the top-level program.
    frames: Vec<Frame>,
}

impl Vm {
    /// Create a VM for a bytecode bundle with an empty globals table.
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Create a VM that reuses an existing globals table, as returned by
    /// [`Vm::into_globals`].  This is how the REPL keeps `let` bindings
    /// alive across compile/run cycles.
    pub fn with_globals(bytecode: Bytecode, mut globals: Vec<Value>) -> Self {
        globals.resize(GLOBALS_SIZE, Value::Null);
        // The top-level program runs as a synthetic zero-argument function
        // whose frame owns the bottom of the stack.
        let main = Rc::new(Function {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main, 0));

        Vm {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// Tear the VM down, returning its globals table for reuse.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The stack slot just above the stack pointer: the most recently popped
    /// value.  After a full program run this is the program's result.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.sp]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fetch-decode-execute loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Run to completion or to the first error.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.current_frame().ip < self.current_frame().instructions().len() {
            let byte = self.current_frame_mut().read_u8();
            let op = Op::try_from(byte).map_err(RuntimeError::UnknownOpcode)?;

            match op {
                Op::Constant => {
                    let idx = self.current_frame_mut().read_u16() as usize;
                    let value = self.constants[idx].clone();
                    self.push(value)?;
                }
                Op::Pop => {
                    self.pop();
                }

                Op::Add | Op::Sub | Op::Mul | Op::Div => self.execute_binary(op)?,

                Op::True => self.push(Value::Bool(true))?,
                Op::False => self.push(Value::Bool(false))?,
                Op::Null => self.push(Value::Null)?,

                Op::Equal | Op::NotEqual | Op::Greater => self.execute_comparison(op)?,

                Op::Minus => {
                    let value = self.pop();
                    match value {
                        Value::Int(n) => self.push(Value::Int(n.wrapping_neg()))?,
                        other => {
                            return Err(RuntimeError::UnsupportedNegation(other.type_name()))
                        }
                    }
                }
                Op::Bang => {
                    let value = self.pop();
                    self.push(Value::Bool(!value.is_truthy()))?;
                }

                Op::Jump => {
                    let target = self.current_frame_mut().read_u16() as usize;
                    self.current_frame_mut().ip = target;
                }
                Op::JumpNotTruthy => {
                    let target = self.current_frame_mut().read_u16() as usize;
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }

                Op::SetGlobal => {
                    let idx = self.current_frame_mut().read_u16() as usize;
                    let value = self.pop();
                    self.globals[idx] = value;
                }
                Op::GetGlobal => {
                    let idx = self.current_frame_mut().read_u16() as usize;
                    let value = self.globals[idx].clone();
                    self.push(value)?;
                }

                Op::SetLocal => {
                    let frame = self.current_frame_mut();
                    let slot = frame.read_u8() as usize;
                    let base = frame.base_pointer;
                    let value = self.pop();
                    self.stack[base + slot] = value;
                }
                Op::GetLocal => {
                    let frame = self.current_frame_mut();
                    let slot = frame.read_u8() as usize;
                    let base = frame.base_pointer;
                    let value = self.stack[base + slot].clone();
                    self.push(value)?;
                }

                Op::Array => {
                    let count = self.current_frame_mut().read_u16() as usize;
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::Array(Rc::new(elements)))?;
                }
                Op::Hash => {
                    let count = self.current_frame_mut().read_u16() as usize;
                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }
                Op::Index => {
                    let index = self.pop();
                    let collection = self.pop();
                    self.execute_index(collection, index)?;
                }

                Op::Call => {
                    let argc = self.current_frame_mut().read_u8() as usize;
                    self.call_function(argc)?;
                }
                Op::ReturnValue => {
                    let return_value = self.pop();
                    if self.return_from_frame(return_value) {
                        return Ok(());
                    }
                }
                Op::ReturnNothing => {
                    if self.return_from_frame(Value::Null) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stack primitives
    // ─────────────────────────────────────────────────────────────────────────

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop the top of the stack.  The value stays in its slot until
    /// overwritten; see [`Vm::last_popped`].
    fn pop(&mut self) -> Value {
        debug_assert!(self.sp > 0, "pop on an empty stack");
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calls and returns
    // ─────────────────────────────────────────────────────────────────────────

    fn call_function(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.sp - 1 - argc].clone();
        let func = match callee {
            Value::Function(func) => func,
            other => return Err(RuntimeError::NotCallable(other.type_name())),
        };
        if argc != func.num_parameters {
            return Err(RuntimeError::WrongArity {
                expected: func.num_parameters,
                got: argc,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }

        // Arguments already sit on the stack and become the first locals;
        // the remaining local slots are reserved above them.
        let base_pointer = self.sp - argc;
        if base_pointer + func.num_locals > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.sp = base_pointer + func.num_locals;
        self.frames.push(Frame::new(func, base_pointer));
        Ok(())
    }

    /// Pop the current frame and leave `return_value` where the callee used
    /// to be.  Returns `true` when the popped frame was the outermost one,
    /// which halts the machine (a top-level `return`).
    fn return_from_frame(&mut self, return_value: Value) -> bool {
        let frame = self.frames.pop().expect("frame stack is never empty");
        if self.frames.is_empty() {
            self.sp = frame.base_pointer;
            self.stack[self.sp] = return_value;
            return true;
        }
        // Rewind past the locals, the arguments, and the callee itself.
        self.sp = frame.base_pointer - 1;
        // The rewind freed at least the callee's slot, so this cannot overflow.
        self.stack[self.sp] = return_value;
        self.sp += 1;
        false
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operators
    // ─────────────────────────────────────────────────────────────────────────

    fn execute_binary(&mut self, op: Op) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();
        let result = match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => match op {
                Op::Add => Value::Int(a.wrapping_add(*b)),
                Op::Sub => Value::Int(a.wrapping_sub(*b)),
                Op::Mul => Value::Int(a.wrapping_mul(*b)),
                Op::Div => {
                    if *b == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    Value::Int(a.wrapping_div(*b))
                }
                _ => unreachable!("non-arithmetic opcode in execute_binary"),
            },
            (Value::Str(a), Value::Str(b)) if op == Op::Add => {
                Value::string(format!("{a}{b}"))
            }
            _ => {
                return Err(RuntimeError::UnsupportedBinary {
                    op: binary_symbol(op),
                    left: left.type_name(),
                    right: right.type_name(),
                })
            }
        };
        self.push(result)
    }

    fn execute_comparison(&mut self, op: Op) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();

        // Integer comparison applies when either operand is an integer; a
        // mixed pair like `1 == true` is a type error.
        if matches!(left, Value::Int(_)) || matches!(right, Value::Int(_)) {
            return self.execute_integer_comparison(op, left, right);
        }

        // Booleans and null are shared singletons, so value equality here is
        // identity equality; strings compare by content.
        match op {
            Op::Equal => self.push(Value::Bool(left == right)),
            Op::NotEqual => self.push(Value::Bool(left != right)),
            _ => Err(RuntimeError::UnsupportedBinary {
                op: binary_symbol(op),
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn execute_integer_comparison(
        &mut self,
        op: Op,
        left: Value,
        right: Value,
    ) -> Result<(), RuntimeError> {
        let (Value::Int(a), Value::Int(b)) = (&left, &right) else {
            return Err(RuntimeError::UnsupportedBinary {
                op: binary_symbol(op),
                left: left.type_name(),
                right: right.type_name(),
            });
        };
        let result = match op {
            Op::Equal => a == b,
            Op::NotEqual => a != b,
            Op::Greater => a > b,
            _ => unreachable!("non-comparison opcode in execute_integer_comparison"),
        };
        self.push(Value::Bool(result))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Composite values
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a hash from the stack slots `[start, end)`, taken as
    /// consecutive key/value pairs.
    fn build_hash(&self, start: usize, end: usize) -> Result<Value, RuntimeError> {
        let mut pairs: HashMap<HashKey, HashPair> = HashMap::with_capacity((end - start) / 2);
        for i in (start..end).step_by(2) {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();
            let hash_key = key
                .hash_key()
                .ok_or_else(|| RuntimeError::UnhashableKey(key.type_name()))?;
            pairs.insert(hash_key, HashPair { key, value });
        }
        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index(&mut self, collection: Value, index: Value) -> Result<(), RuntimeError> {
        match (&collection, &index) {
            // Out-of-bounds array access and hash misses produce null, never
            // an error.
            (Value::Array(elements), Value::Int(i)) => {
                let value = usize::try_from(*i)
                    .ok()
                    .and_then(|i| elements.get(i).cloned())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            (Value::Hash(pairs), _) => {
                let hash_key = index
                    .hash_key()
                    .ok_or_else(|| RuntimeError::UnhashableKey(index.type_name()))?;
                let value = pairs
                    .get(&hash_key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            _ => Err(RuntimeError::IndexNotSupported(collection.type_name())),
        }
    }
}

/// The source-level symbol of a binary opcode, for error messages.
fn binary_symbol(op: Op) -> &'static str {
    match op {
        Op::Add => "+",
        Op::Sub => "-",
        Op::Mul => "*",
        Op::Div => "/",
        Op::Equal => "==",
        Op::NotEqual => "!=",
        Op::Greater => ">",
        _ => "?",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
