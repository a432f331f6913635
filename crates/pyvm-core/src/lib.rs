//! pyvm - Core Library
//!
//! Decoder, disassembler and interpreter loop for a subset of CPython 3.12
//! bytecode, plus the value model they share.

pub mod error;
pub mod config;
pub mod bytecode;
pub mod vm;
pub mod native;

// Re-export commonly used types
pub use error::{PoolKind, VmError, VmResult};
pub use config::{ArgCountSource, VmConfig};
pub use bytecode::{CodeObject, OpCode, OperandExtensions};
pub use native::{BuiltinTable, NativeError, NativeFunction};
pub use vm::{Globals, SharedGlobals, Value, VirtualMachine};

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const CALL_PAD: [u8; 6] = [0; 6];

    fn module(constants: Vec<Value>, names: &[&str], code: Vec<u8>) -> Rc<CodeObject> {
        Rc::new(CodeObject::new(
            "<module>",
            "test.py",
            1,
            constants,
            names.iter().map(|n| n.to_string()).collect(),
            code,
        ))
    }

    fn call(operand: u8) -> Vec<u8> {
        let mut bytes = vec![OpCode::Call as u8, operand];
        bytes.extend_from_slice(&CALL_PAD);
        bytes
    }

    /// Builtins with a `record` native that remembers every argument list
    fn recording_builtins() -> (BuiltinTable, Rc<RefCell<Vec<Vec<Value>>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        let mut builtins = BuiltinTable::new();
        builtins.register("record", move |args| {
            sink.borrow_mut().push(args.to_vec());
            Ok(Value::None)
        });
        (builtins, calls)
    }

    #[test]
    fn load_const_then_pop_top_is_neutral() {
        let code = module(
            vec![Value::Integer(5)],
            &[],
            vec![OpCode::LoadConst as u8, 0, OpCode::PopTop as u8, 0],
        );
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        vm.execute().expect("execution failed");
        assert_eq!(vm.stack_depth(), 0);
        assert!(vm.globals().borrow().is_empty());
    }

    #[test]
    fn store_then_load_round_trips() {
        let value = Value::Tuple(vec![Value::Str("a".into()), Value::Float(1.5)]);
        let code = module(
            vec![value.clone()],
            &["t"],
            vec![
                OpCode::LoadConst as u8, 0,
                OpCode::StoreName as u8, 0,
                OpCode::LoadName as u8, 0,
            ],
        );
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        vm.execute().expect("execution failed");
        assert_eq!(vm.peek_top().expect("peek failed"), value);
        assert_eq!(vm.globals().borrow().lookup("t").expect("bound"), value);
    }

    #[test]
    fn assign_and_print_program() {
        // x = 1; record(x)
        let mut bytes = vec![
            OpCode::LoadConst as u8, 0,
            OpCode::StoreName as u8, 1,
            OpCode::PushNull as u8, 0,
            OpCode::LoadName as u8, 0,
            OpCode::LoadName as u8, 1,
        ];
        bytes.extend(call(1));
        let code = module(vec![Value::Integer(1), Value::Integer(1)], &["record", "x"], bytes);

        let (builtins, calls) = recording_builtins();
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &builtins);
        vm.execute().expect("execution failed");

        assert_eq!(vm.globals().borrow().lookup("x").expect("bound"), Value::Integer(1));
        assert_eq!(*calls.borrow(), vec![vec![Value::Integer(1)]]);
        // result pushed, NULL marker consumed
        assert_eq!(vm.stack_depth(), 1);
        assert_eq!(vm.peek_top().expect("peek failed"), Value::None);
    }

    #[test]
    fn call_arguments_keep_left_to_right_order() {
        let mut bytes = vec![
            OpCode::PushNull as u8, 0,
            OpCode::LoadName as u8, 0,
            OpCode::LoadConst as u8, 1,
            OpCode::LoadConst as u8, 2,
            OpCode::LoadConst as u8, 3,
        ];
        bytes.extend(call(0));
        let code = module(
            vec![
                Value::Integer(3),
                Value::Str("a".into()),
                Value::Str("b".into()),
                Value::Str("c".into()),
            ],
            &["record"],
            bytes,
        );
        let (builtins, calls) = recording_builtins();
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &builtins);
        vm.execute().expect("execution failed");
        assert_eq!(
            calls.borrow()[0],
            vec![Value::Str("a".into()), Value::Str("b".into()), Value::Str("c".into())]
        );
    }

    #[test]
    fn call_underflow_is_reported() {
        // argument count constant says 2, only one value above the callee
        let mut bytes = vec![
            OpCode::LoadName as u8, 0,
            OpCode::LoadConst as u8, 1,
        ];
        bytes.extend(call(0));
        let code = module(vec![Value::Integer(2), Value::Integer(9)], &["record"], bytes);
        let (builtins, calls) = recording_builtins();
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &builtins);

        match vm.execute() {
            Err(VmError::StackUnderflow { needed: 3, available: 2 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn operand_arg_count_mode() {
        let mut bytes = vec![
            OpCode::PushNull as u8, 0,
            OpCode::LoadName as u8, 0,
            OpCode::LoadConst as u8, 0,
        ];
        bytes.extend(call(1));
        let code = module(vec![Value::Str("only".into())], &["record"], bytes);
        let (builtins, calls) = recording_builtins();
        let mut config = VmConfig::new();
        config.arg_count_source = ArgCountSource::Operand;
        let mut vm = VirtualMachine::with_builtins(config, code, &builtins);
        vm.execute().expect("execution failed");
        assert_eq!(calls.borrow()[0], vec![Value::Str("only".into())]);
    }

    #[test]
    fn unsupported_opcode_halts_before_later_instructions() {
        let code = module(
            vec![Value::Integer(1)],
            &["x"],
            vec![
                OpCode::LoadConst as u8, 0,
                122, 0, // BINARY_OP
                OpCode::StoreName as u8, 0,
            ],
        );
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        match vm.execute() {
            Err(VmError::UnsupportedOpcode { opcode: 122, name: "BINARY_OP", offset: 2 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!vm.globals().borrow().contains("x"));
        assert_eq!(vm.ip(), 2);
    }

    #[test]
    fn delete_name_removes_binding_and_leaves_code_intact() {
        let code = module(
            vec![Value::Integer(1)],
            &["x"],
            vec![
                OpCode::LoadConst as u8, 0,
                OpCode::StoreName as u8, 0,
                OpCode::DeleteName as u8, 0,
            ],
        );
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), Rc::clone(&code), &BuiltinTable::new());
        vm.execute().expect("execution failed");
        assert!(!vm.globals().borrow().contains("x"));
        assert_eq!(code.names().get(0).expect("name kept"), "x");
    }

    #[test]
    fn delete_unbound_name_is_an_error() {
        let code = module(Vec::new(), &["ghost"], vec![OpCode::DeleteName as u8, 0]);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        assert!(matches!(vm.execute(), Err(VmError::UnresolvedName(ref n)) if n == "ghost"));
    }

    #[test]
    fn load_unbound_name_is_an_error() {
        let code = module(Vec::new(), &["nope"], vec![OpCode::LoadName as u8, 0]);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        assert!(matches!(vm.execute(), Err(VmError::UnresolvedName(_))));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn pop_on_empty_stack_underflows() {
        let code = module(Vec::new(), &[], vec![OpCode::PopTop as u8, 0]);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        assert!(matches!(
            vm.execute(),
            Err(VmError::StackUnderflow { needed: 1, available: 0 })
        ));
    }

    #[test]
    fn stack_overflow_trapped() {
        let mut cfg = VmConfig::new();
        cfg.max_stack_size = 1;
        let code = module(
            vec![Value::Integer(1)],
            &[],
            vec![OpCode::LoadConst as u8, 0, OpCode::LoadConst as u8, 0],
        );
        let mut vm = VirtualMachine::with_builtins(cfg, code, &BuiltinTable::new());
        assert!(matches!(vm.execute(), Err(VmError::StackOverflow(1))));
    }

    #[test]
    fn constant_index_out_of_range() {
        let code = module(Vec::new(), &[], vec![OpCode::LoadConst as u8, 7]);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        assert!(matches!(
            vm.execute(),
            Err(VmError::PoolIndex { pool: PoolKind::Constant, index: 7, len: 0 })
        ));
    }

    #[test]
    fn calling_a_non_callable_fails() {
        let mut bytes = vec![OpCode::LoadConst as u8, 1];
        bytes.extend(call(0));
        let code = module(vec![Value::Integer(0), Value::Str("s".into())], &[], bytes);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        assert!(matches!(vm.execute(), Err(VmError::NotCallable("str"))));
    }

    #[test]
    fn native_failure_is_propagated() {
        let mut builtins = BuiltinTable::new();
        builtins.register("boom", |_| Err(NativeError::Other("kaput".into())));
        let mut bytes = vec![OpCode::PushNull as u8, 0, OpCode::LoadName as u8, 0];
        bytes.extend(call(0));
        let code = module(vec![Value::Integer(0)], &["boom"], bytes);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &builtins);
        match vm.execute() {
            Err(VmError::NativeCall { callee, source }) => {
                assert_eq!(callee, "boom");
                assert_eq!(source.to_string(), "kaput");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn truncated_call_extension_is_a_decode_error() {
        let code = module(vec![Value::Integer(0)], &[], vec![OpCode::Call as u8, 0, 0, 0]);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        assert!(matches!(vm.execute(), Err(VmError::TruncatedExtension { .. })));
    }

    #[test]
    fn resume_import_and_return_const_leave_state_alone() {
        let code = module(
            vec![Value::None],
            &["os"],
            vec![
                OpCode::Resume as u8, 0,
                OpCode::ImportName as u8, 0,
                OpCode::ReturnConst as u8, 0,
            ],
        );
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        vm.execute().expect("execution failed");
        assert_eq!(vm.stack_depth(), 0);
        assert!(vm.globals().borrow().is_empty());
        assert_eq!(vm.ip(), 6);
    }

    fn function_body(names: &[&str], bytes: Vec<u8>) -> Rc<CodeObject> {
        Rc::new(CodeObject::new(
            "f",
            "test.py",
            2,
            vec![Value::Integer(0), Value::None],
            names.iter().map(|n| n.to_string()).collect(),
            bytes,
        ))
    }

    #[test]
    fn function_sees_later_environment_changes() {
        // def f(): record(y)   -- y is bound only after f is created
        let mut body = vec![
            OpCode::Resume as u8, 0,
            OpCode::PushNull as u8, 0,
            OpCode::LoadName as u8, 0,
            OpCode::LoadName as u8, 1,
        ];
        body.extend(call(1));
        body.extend([OpCode::PopTop as u8, 0, OpCode::ReturnConst as u8, 2]);
        // CALL 1 in the body reads its count from constants[1]
        let f_code = Rc::new(CodeObject::new(
            "f",
            "test.py",
            2,
            vec![Value::Integer(0), Value::Integer(1), Value::None],
            vec!["record".into(), "y".into()],
            body,
        ));

        let mut bytes = vec![
            OpCode::MakeFunction as u8, 0,
            OpCode::StoreName as u8, 0,
            OpCode::LoadConst as u8, 1,
            OpCode::StoreName as u8, 1,
            OpCode::PushNull as u8, 0,
            OpCode::LoadName as u8, 0,
        ];
        bytes.extend(call(2));
        let code = module(
            vec![Value::CodeRef(f_code), Value::Str("late".into()), Value::Integer(0)],
            &["f", "y"],
            bytes,
        );

        let (builtins, calls) = recording_builtins();
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &builtins);
        vm.execute().expect("execution failed");

        assert_eq!(*calls.borrow(), vec![vec![Value::Str("late".into())]]);
        assert_eq!(vm.peek_top().expect("peek failed"), Value::None);
        match vm.globals().borrow().lookup("f").expect("bound") {
            Value::Function(func) => assert!(Rc::ptr_eq(&func.captured_globals, &vm.globals())),
            other => panic!("unexpected binding: {:?}", other),
        }
    }

    #[test]
    fn function_arity_is_checked() {
        let f_code = function_body(&[], vec![OpCode::Resume as u8, 0]);
        let mut bytes = vec![
            OpCode::MakeFunction as u8, 0,
            OpCode::LoadConst as u8, 1,
        ];
        bytes.extend(call(1));
        let code = module(vec![Value::CodeRef(f_code), Value::Integer(1)], &[], bytes);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        assert!(matches!(
            vm.execute(),
            Err(VmError::ArityMismatch { expected: 0, given: 1, .. })
        ));
    }

    /// def f(): f()
    /// f()
    fn runaway_recursion() -> Rc<CodeObject> {
        let mut body = vec![OpCode::LoadName as u8, 0];
        body.extend(call(0));
        let f_code = function_body(&["f"], body);

        let mut bytes = vec![
            OpCode::MakeFunction as u8, 0,
            OpCode::StoreName as u8, 0,
            OpCode::LoadName as u8, 0,
        ];
        bytes.extend(call(1));
        module(vec![Value::CodeRef(f_code), Value::Integer(0)], &["f"], bytes)
    }

    #[test]
    fn recursion_is_bounded() {
        let mut cfg = VmConfig::new();
        cfg.max_call_depth = 8;
        let mut vm = VirtualMachine::with_builtins(cfg, runaway_recursion(), &BuiltinTable::new());
        assert!(matches!(vm.execute(), Err(VmError::CallDepthExceeded(8))));
        assert_eq!(vm.depth(), 8);
    }

    #[test]
    fn default_call_depth_is_reached_without_native_recursion() {
        let mut vm =
            VirtualMachine::with_builtins(VmConfig::new(), runaway_recursion(), &BuiltinTable::new());
        assert!(matches!(vm.execute(), Err(VmError::CallDepthExceeded(256))));
    }

    #[test]
    fn very_deep_call_depth_stays_a_reported_error() {
        let mut cfg = VmConfig::new();
        cfg.max_call_depth = 100_000;
        let mut vm = VirtualMachine::with_builtins(cfg, runaway_recursion(), &BuiltinTable::new());
        assert!(matches!(vm.execute(), Err(VmError::CallDepthExceeded(100_000))));
        assert_eq!(vm.code().name(), "f");
    }

    #[test]
    fn error_in_function_body_leaves_its_frame_current() {
        // def f(): missing
        let f_code = function_body(
            &["missing"],
            vec![OpCode::Resume as u8, 0, OpCode::LoadName as u8, 0],
        );
        let mut bytes = vec![OpCode::MakeFunction as u8, 0];
        bytes.extend(call(0));
        let code = module(vec![Value::CodeRef(f_code)], &[], bytes);
        // constants[0] is the code object, so count from the operand
        let mut cfg = VmConfig::new();
        cfg.arg_count_source = ArgCountSource::Operand;
        let mut vm = VirtualMachine::with_builtins(cfg, code, &BuiltinTable::new());

        assert!(matches!(vm.execute(), Err(VmError::UnresolvedName(name)) if name == "missing"));
        assert_eq!(vm.depth(), 1);
        assert_eq!(vm.code().name(), "f");
        assert_eq!(vm.ip(), 2);
    }

    #[test]
    fn function_return_pushes_none_for_the_caller() {
        let f_code = function_body(&[], vec![OpCode::Resume as u8, 0]);
        let mut bytes = vec![OpCode::PushNull as u8, 0, OpCode::MakeFunction as u8, 0];
        bytes.extend(call(1));
        let code = module(vec![Value::CodeRef(f_code), Value::Integer(0)], &[], bytes);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());

        vm.step().expect("PUSH_NULL");
        vm.step().expect("MAKE_FUNCTION");
        vm.step().expect("CALL");
        assert_eq!(vm.depth(), 1);
        assert!(!vm.is_finished());

        vm.execute().expect("execution failed");
        assert!(vm.is_finished());
        assert_eq!(vm.depth(), 0);
        assert_eq!(vm.stack_depth(), 1);
        assert_eq!(vm.peek_top().expect("peek failed"), Value::None);
    }

    #[test]
    fn make_function_requires_code_constant() {
        let code = module(vec![Value::Integer(3)], &[], vec![OpCode::MakeFunction as u8, 0]);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        assert!(matches!(
            vm.execute(),
            Err(VmError::TypeMismatch { expected: "code", found: "int", .. })
        ));
    }

    #[test]
    fn trace_records_resolved_arguments() {
        let mut bytes = vec![
            OpCode::LoadConst as u8, 0,
            OpCode::StoreName as u8, 1,
            OpCode::PushNull as u8, 0,
            OpCode::LoadName as u8, 0,
            OpCode::LoadName as u8, 1,
        ];
        bytes.extend(call(0));
        let code = module(vec![Value::Integer(1)], &["record", "x"], bytes);
        let (builtins, _calls) = recording_builtins();
        let mut cfg = VmConfig::new();
        cfg.record_trace = true;
        let mut vm = VirtualMachine::with_builtins(cfg, code, &builtins);
        vm.execute().expect("execution failed");

        let trace = vm.drain_trace();
        assert_eq!(trace.len(), 6);
        assert_eq!(trace[1].detail.as_deref(), Some("x = 1"));
        assert_eq!(trace[2].detail, None);
        assert_eq!(trace[5].offset, 10);
        assert_eq!(
            trace[5].detail.as_deref(),
            Some("<built-in function record>(1) -> None")
        );
        assert_eq!(trace[1].to_string(), "   2: STORE_NAME 1\t# x = 1");
        assert!(vm.drain_trace().is_empty());
    }

    #[test]
    fn trace_is_off_by_default() {
        let code = module(vec![Value::Integer(1)], &[], vec![OpCode::LoadConst as u8, 0]);
        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &BuiltinTable::new());
        vm.execute().expect("execution failed");
        assert!(vm.drain_trace().is_empty());
    }

    #[test]
    fn trace_sink_streams_entries_between_native_calls() {
        // def f(): record(1)
        // f()
        let mut body = vec![
            OpCode::PushNull as u8, 0,
            OpCode::LoadName as u8, 0,
            OpCode::LoadConst as u8, 1,
        ];
        body.extend(call(1));
        let f_code = Rc::new(CodeObject::new(
            "f",
            "test.py",
            2,
            vec![Value::Integer(0), Value::Integer(1)],
            vec!["record".into()],
            body,
        ));
        let mut bytes = vec![OpCode::MakeFunction as u8, 0];
        bytes.extend(call(1));
        let code = module(vec![Value::CodeRef(f_code), Value::Integer(0)], &[], bytes);

        let log = Rc::new(RefCell::new(Vec::<String>::new()));
        let native_log = Rc::clone(&log);
        let mut builtins = BuiltinTable::new();
        builtins.register("record", move |_| {
            native_log.borrow_mut().push("record ran".to_string());
            Ok(Value::None)
        });

        let mut vm = VirtualMachine::with_builtins(VmConfig::new(), code, &builtins);
        let sink_log = Rc::clone(&log);
        vm.set_trace_sink(move |entry| {
            let line = format!("{}@{} {}", entry.depth, entry.offset, entry.opname);
            sink_log.borrow_mut().push(line);
        });
        vm.execute().expect("execution failed");

        assert_eq!(
            *log.borrow(),
            vec![
                "0@0 MAKE_FUNCTION",
                "0@2 CALL",
                "1@0 PUSH_NULL",
                "1@2 LOAD_NAME",
                "1@4 LOAD_CONST",
                "record ran",
                "1@6 CALL",
            ]
        );
        // record_trace is off, so nothing was buffered
        assert!(vm.drain_trace().is_empty());
    }
}
