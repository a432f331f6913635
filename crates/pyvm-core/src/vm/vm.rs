//! Virtual Machine Core
//!
//! Defines the virtual machine structure and its fetch-decode-execute loop.
//! The loop runs from offset 0 until the instruction pointer reaches the end
//! of the code; there are no jumps, and any opcode outside the supported
//! subset stops the run with [`VmError::UnsupportedOpcode`].
//!
//! Calling a function pushes a call frame onto an explicit call stack
//! that the same loop keeps executing; a frame whose bytes run out returns
//! `None` to its caller. Nesting is bounded by `max_call_depth` only.

use std::fmt;
use std::rc::Rc;

use tracing::{debug, debug_span, trace, warn};

use crate::bytecode::code::CodeObject;
use crate::bytecode::decoder::decode;
use crate::bytecode::opcode::OpCode;
use crate::config::{ArgCountSource, VmConfig};
use crate::error::{VmError, VmResult};
use crate::native::BuiltinTable;

use super::memory::{Globals, SharedGlobals};
use super::stack::Stack;
use super::value::{Function, Value};

/// One executed instruction, recorded when `record_trace` is set
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    /// Function nesting level, 0 for the top-level code
    pub depth: usize,
    pub offset: usize,
    pub opname: &'static str,
    pub operand: u8,
    /// Resolved argument or effect, when the opcode has one
    pub detail: Option<String>,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:indent$}{:4}: {} {}",
            "",
            self.offset,
            self.opname,
            self.operand,
            indent = self.depth * 2
        )?;
        if let Some(detail) = &self.detail {
            write!(f, "\t# {}", detail)?;
        }
        Ok(())
    }
}

/// Call frame representing a single code object activation
#[derive(Debug)]
struct CallFrame {
    code: Rc<CodeObject>,
    globals: SharedGlobals,
    stack: Stack,
    ip: usize,
}

impl CallFrame {
    fn new(code: Rc<CodeObject>, globals: SharedGlobals, max_stack_size: usize) -> Self {
        CallFrame {
            code,
            globals,
            stack: Stack::new(max_stack_size),
            ip: 0,
        }
    }

    fn is_exhausted(&self) -> bool {
        self.ip >= self.code.code().len()
    }
}

/// Control flow after one instruction
enum Flow {
    Next(Option<String>),
    Enter(CallFrame, String),
}

/// Callback receiving trace entries as they are produced
struct TraceSink(Box<dyn FnMut(&TraceEntry)>);

impl fmt::Debug for TraceSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TraceSink")
    }
}

/// Virtual Machine
#[derive(Debug)]
pub struct VirtualMachine {
    config: VmConfig,

    /// Frame being executed
    frame: CallFrame,
    /// Suspended callers, outermost first
    call_stack: Vec<CallFrame>,

    trace: Vec<TraceEntry>,
    sink: Option<TraceSink>,
}

impl VirtualMachine {
    /// Create a VM running `code` against an existing environment
    pub fn new(config: VmConfig, code: Rc<CodeObject>, globals: SharedGlobals) -> Self {
        VirtualMachine {
            frame: CallFrame::new(code, globals, config.max_stack_size),
            config,
            call_stack: Vec::new(),
            trace: Vec::new(),
            sink: None,
        }
    }

    /// Create a VM with a fresh environment seeded from `builtins`
    pub fn with_builtins(config: VmConfig, code: Rc<CodeObject>, builtins: &BuiltinTable) -> Self {
        Self::new(config, code, Globals::seeded(builtins).into_shared())
    }

    /// Hand every trace entry to `sink` as soon as its instruction has run
    pub fn set_trace_sink<F>(&mut self, sink: F)
    where
        F: FnMut(&TraceEntry) + 'static,
    {
        self.sink = Some(TraceSink(Box::new(sink)));
    }

    /// Execute until the end of the top-level code or the first error
    pub fn execute(&mut self) -> VmResult<()> {
        let span = debug_span!("execute", code = %self.root().code.name());
        let _enter = span.enter();

        while !self.is_finished() {
            self.step()?;
        }
        Ok(())
    }

    /// True once the top-level code has run to its end
    pub fn is_finished(&self) -> bool {
        self.call_stack.is_empty() && self.frame.is_exhausted()
    }

    /// Execute a single instruction, first returning from finished functions
    pub fn step(&mut self) -> VmResult<()> {
        self.unwind()?;
        if self.frame.is_exhausted() {
            return Ok(());
        }

        let depth = self.depth();
        let instr = decode(
            self.frame.code.code(),
            self.frame.ip,
            &self.config.operand_extensions,
        )?;
        let op = instr.op().ok_or(VmError::UnsupportedOpcode {
            opcode: instr.opcode,
            name: instr.name(),
            offset: instr.offset,
        })?;

        let detail = match self.dispatch(op, instr.operand)? {
            Flow::Next(detail) => {
                self.frame.ip = instr.next_offset();
                detail
            }
            Flow::Enter(callee, detail) => {
                self.frame.ip = instr.next_offset();
                let caller = std::mem::replace(&mut self.frame, callee);
                self.call_stack.push(caller);
                debug!(
                    function = self.frame.code.name(),
                    depth = self.depth(),
                    "entering function"
                );
                Some(detail)
            }
        };

        trace!(
            depth,
            offset = instr.offset,
            op = instr.name(),
            operand = instr.operand,
            detail = detail.as_deref().unwrap_or(""),
            "exec"
        );
        if self.config.record_trace || self.sink.is_some() {
            self.emit(TraceEntry {
                depth,
                offset: instr.offset,
                opname: instr.name(),
                operand: instr.operand,
                detail,
            });
        }
        Ok(())
    }

    /// Pop every frame that has run out of bytes; each call evaluates to `None`
    fn unwind(&mut self) -> VmResult<()> {
        while self.frame.is_exhausted() {
            let Some(caller) = self.call_stack.pop() else {
                break;
            };
            let finished = std::mem::replace(&mut self.frame, caller);
            debug!(
                function = finished.code.name(),
                depth = self.depth() + 1,
                "leaving function"
            );
            self.frame.stack.push(Value::None)?;
        }
        Ok(())
    }

    fn emit(&mut self, entry: TraceEntry) {
        if let Some(TraceSink(sink)) = self.sink.as_mut() {
            sink(&entry);
        }
        if self.config.record_trace {
            self.trace.push(entry);
        }
    }

    fn dispatch(&mut self, op: OpCode, operand: u8) -> VmResult<Flow> {
        let index = operand as usize;
        let frame = &mut self.frame;
        let detail = match op {
            OpCode::Resume => None,

            OpCode::LoadConst => {
                let value = frame.code.constants().get(index)?.clone();
                let detail = value.repr();
                frame.stack.push(value)?;
                Some(detail)
            }

            OpCode::ReturnConst => {
                // Read for diagnostics only; there is no frame to return from.
                let value = frame.code.constants().get(index)?;
                Some(value.repr())
            }

            OpCode::LoadName => {
                let name = frame.code.names().get(index)?;
                let value = frame.globals.borrow().lookup(name)?;
                let detail = format!("{} = {}", name, value.repr());
                frame.stack.push(value)?;
                Some(detail)
            }

            OpCode::StoreName => {
                let name = frame.code.names().get(index)?.to_string();
                let value = frame.stack.pop()?;
                let detail = format!("{} = {}", name, value.repr());
                frame.globals.borrow_mut().bind(name, value);
                Some(detail)
            }

            OpCode::DeleteName => {
                let name = frame.code.names().get(index)?;
                frame.globals.borrow_mut().unbind(name)?;
                Some(name.to_string())
            }

            OpCode::PushNull => {
                frame.stack.push(Value::Undefined)?;
                None
            }

            OpCode::PopTop => {
                let value = frame.stack.pop()?;
                Some(value.repr())
            }

            OpCode::ImportName => {
                let name = frame.code.names().get(index)?;
                warn!(module = name, "IMPORT_NAME is not implemented; nothing is imported");
                Some(name.to_string())
            }

            OpCode::MakeFunction => {
                let code = match frame.code.constants().get(index)? {
                    Value::CodeRef(code) => Rc::clone(code),
                    other => {
                        return Err(VmError::TypeMismatch {
                            context: "MAKE_FUNCTION",
                            expected: "code",
                            found: other.type_name(),
                        })
                    }
                };
                let func = Value::Function(Function::new(code, Rc::clone(&frame.globals)));
                let detail = func.repr();
                frame.stack.push(func)?;
                Some(detail)
            }

            OpCode::Call => return self.call(operand),
        };
        Ok(Flow::Next(detail))
    }

    /// Pop arguments and callee, then run natives in place or enter a function
    fn call(&mut self, operand: u8) -> VmResult<Flow> {
        let argc = self.arg_count(operand)?;
        let stack = &mut self.frame.stack;
        let available = stack.size();
        if available < argc + 1 {
            return Err(VmError::StackUnderflow {
                needed: argc + 1,
                available,
            });
        }

        let args = stack.pop_n(argc)?;
        let callee = stack.pop()?;
        // PUSH_NULL marks "no implicit receiver"; the call consumes it.
        if matches!(stack.peek(), Ok(Value::Undefined)) {
            stack.pop()?;
        }

        let rendered: Vec<String> = args.iter().map(Value::repr).collect();
        match &callee {
            Value::Native(native) => {
                debug!(callee = native.name(), argc, "native call");
                let result = native.call(&args).map_err(|source| VmError::NativeCall {
                    callee: native.name().to_string(),
                    source,
                })?;
                let detail = format!("{}({}) -> {}", callee, rendered.join(", "), result.repr());
                self.frame.stack.push(result)?;
                Ok(Flow::Next(Some(detail)))
            }
            Value::Function(func) => {
                let frame = self.function_frame(func, args.len())?;
                Ok(Flow::Enter(frame, format!("{}({})", callee, rendered.join(", "))))
            }
            other => Err(VmError::NotCallable(other.type_name())),
        }
    }

    fn arg_count(&self, operand: u8) -> VmResult<usize> {
        match self.config.arg_count_source {
            ArgCountSource::Operand => Ok(operand as usize),
            ArgCountSource::ConstantPool => {
                let count = self.frame.code.constants().get(operand as usize)?;
                count
                    .as_int()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or(VmError::TypeMismatch {
                        context: "CALL argument count",
                        expected: "non-negative int",
                        found: count.type_name(),
                    })
            }
        }
    }

    /// Frame for a function body: fresh stack, captured environment.
    ///
    /// The supported subset has no local-variable opcodes, so arguments are
    /// only checked against the declared count.
    fn function_frame(&self, func: &Function, given: usize) -> VmResult<CallFrame> {
        let expected = func.code.arg_count();
        if given != expected {
            return Err(VmError::ArityMismatch {
                function: func.name().to_string(),
                expected,
                given,
            });
        }
        if self.depth() + 1 > self.config.max_call_depth {
            return Err(VmError::CallDepthExceeded(self.config.max_call_depth));
        }
        Ok(CallFrame::new(
            Rc::clone(&func.code),
            Rc::clone(&func.captured_globals),
            self.config.max_stack_size,
        ))
    }

    fn root(&self) -> &CallFrame {
        self.call_stack.first().unwrap_or(&self.frame)
    }

    /// Handle to the top-level environment
    pub fn globals(&self) -> SharedGlobals {
        Rc::clone(&self.root().globals)
    }

    /// Code object of the frame being executed
    pub fn code(&self) -> &Rc<CodeObject> {
        &self.frame.code
    }

    /// Offset of the next instruction in the current frame
    pub fn ip(&self) -> usize {
        self.frame.ip
    }

    /// Number of function frames above the top-level code
    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn stack_depth(&self) -> usize {
        self.frame.stack.size()
    }

    pub fn peek_top(&self) -> VmResult<Value> {
        self.frame.stack.peek().cloned()
    }

    /// Take the recorded trace, leaving the buffer empty
    pub fn drain_trace(&mut self) -> Vec<TraceEntry> {
        std::mem::take(&mut self.trace)
    }
}
