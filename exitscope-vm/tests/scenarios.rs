//! End-to-end scenarios: build a module the way a front-end would, run the
//! instrumentation pass, execute the result, and check the transcript.

use gimli::constants as dw;

use exitscope_compiler::InstrumentOptions;
use exitscope_ir::debug::well_known;
use exitscope_ir::{
    Aggregate, Builder, DebugMember, DebugType, DebugTypeId, DebugVariable, Function, FunctionId,
    InsertPoint, Module, Ty, Value, VariableKind,
};
use exitscope_protocol::output_file_name;
use exitscope_vm::Vm;

fn instrument_and_run(module: &mut Module, options: InstrumentOptions) -> Vec<String> {
    let dir = tempfile::tempdir().unwrap();
    exitscope_compiler::run(module, &options, dir.path()).unwrap();
    let mut vm = Vm::new(module, dir.path()).unwrap();
    vm.run().unwrap();
    let transcript = dir.path().join(output_file_name(&module.source_file));
    std::fs::read_to_string(transcript)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn local_var(
    module: &mut Module,
    name: &str,
    scope: &str,
    ty: DebugTypeId,
) -> exitscope_ir::DebugVariableId {
    module.add_debug_variable(DebugVariable {
        name: name.to_string(),
        scope: scope.to_string(),
        ty: Some(ty),
        artificial: false,
        kind: VariableKind::Local,
    })
}

fn pointer_to(module: &mut Module, base: DebugTypeId) -> DebugTypeId {
    module.add_debug_type(DebugType::Derived {
        tag: dw::DW_TAG_pointer_type.0,
        name: String::new(),
        base: Some(base),
    })
}

/// `int x = 42; return 0;`
#[test]
fn scalar_int_is_reported_at_exit() {
    let mut module = Module::new("s1", "s1.c");
    let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
    let x = local_var(&mut module, "x", "main", int_ty);
    let main = module.add_function(Function::new("main", Ty::I32));
    let entry = module.functions[main].add_block("entry");
    let mut b = Builder::at(&mut module, main, entry, InsertPoint::BlockEnd);
    b.dbg_value(x, Value::i32(42));
    b.ret(Some(Value::i32(0)));

    let lines = instrument_and_run(&mut module, InstrumentOptions::default());
    assert_eq!(lines, vec!["x main 1 : 42"]);
}

/// `int* a = malloc(3*sizeof(int)); a[0]=1; a[1]=2; a[2]=3;`
#[test]
fn heap_array_reports_its_fingerprint() {
    let mut module = Module::new("s2", "s2.c");
    let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
    let int_ptr = pointer_to(&mut module, int_ty);
    let a = local_var(&mut module, "a", "main", int_ptr);
    let main = module.add_function(Function::new("main", Ty::I32));
    let entry = module.functions[main].add_block("entry");
    let mut b = Builder::at(&mut module, main, entry, InsertPoint::BlockEnd);
    let raw = b.call("malloc", Ty::ptr_to(Ty::I8), vec![Value::i64(12)]);
    let typed = b.cast(Value::Inst(raw), Ty::ptr_to(Ty::I32));
    b.dbg_value(a, Value::Inst(typed));
    for (i, v) in [1i32, 2, 3].into_iter().enumerate() {
        let slot = b.index_addr(Value::Inst(typed), Value::i64(i as i64), Ty::I32);
        b.store(Value::i32(v), Value::Inst(slot));
    }
    b.ret(Some(Value::i32(0)));

    let options = InstrumentOptions {
        precise: true,
        ..Default::default()
    };
    let lines = instrument_and_run(&mut module, options);
    // 31*1+1 = 32; 31*32+2 = 994; 31*994+3 = 30817
    assert_eq!(lines, vec!["a main 1: 30817"]);
}

/// `union U { int i; char c[4]; } u; u.i = 0x01020304;`
#[test]
fn union_dumps_its_bytes() {
    let mut module = Module::new("s3", "s3.c");
    module.aggregates.insert(
        "U".to_string(),
        Aggregate {
            name: Some("U".to_string()),
            is_union: true,
            opaque: false,
            fields: vec![Ty::I32, Ty::array_of(Ty::I8, 4)],
        },
    );
    let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
    let char_ty = module.add_debug_type(well_known::signed_char());
    let char_array = module.add_debug_type(DebugType::Composite {
        tag: dw::DW_TAG_array_type.0,
        name: String::new(),
        base: Some(char_ty),
        dims: vec![exitscope_ir::ElementCount::Const(4)],
        members: Vec::new(),
        size_bits: 32,
    });
    let union_ty = module.add_debug_type(DebugType::Composite {
        tag: dw::DW_TAG_union_type.0,
        name: "U".to_string(),
        base: None,
        dims: Vec::new(),
        members: vec![
            DebugMember {
                name: "i".to_string(),
                ty: Some(int_ty),
                offset_bits: 0,
            },
            DebugMember {
                name: "c".to_string(),
                ty: Some(char_array),
                offset_bits: 0,
            },
        ],
        size_bits: 32,
    });
    let u = local_var(&mut module, "u", "main", union_ty);
    let main = module.add_function(Function::new("main", Ty::I32));
    let entry = module.functions[main].add_block("entry");
    let mut b = Builder::at(&mut module, main, entry, InsertPoint::BlockEnd);
    let slot = b.alloca(Ty::Aggregate("U".to_string()), "u");
    b.dbg_declare(u, Value::Inst(slot));
    b.store(Value::i32(0x01020304), Value::Inst(slot));
    b.ret(Some(Value::i32(0)));

    let lines = instrument_and_run(&mut module, InstrumentOptions::default());
    // Little-endian byte order: 04 03 02 01.
    assert_eq!(lines, vec!["u main 1 : 4321"]);
}

/// `int* p = malloc(sizeof(int)); *p = 7; free(p);` under precise mode.
#[test]
fn freed_block_reports_freed() {
    let mut module = Module::new("s4", "s4.c");
    let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
    let int_ptr = pointer_to(&mut module, int_ty);
    let p = local_var(&mut module, "p", "main", int_ptr);
    let main = module.add_function(Function::new("main", Ty::I32));
    let entry = module.functions[main].add_block("entry");
    let mut b = Builder::at(&mut module, main, entry, InsertPoint::BlockEnd);
    let raw = b.call("malloc", Ty::ptr_to(Ty::I8), vec![Value::i64(4)]);
    let typed = b.cast(Value::Inst(raw), Ty::ptr_to(Ty::I32));
    b.dbg_value(p, Value::Inst(typed));
    b.store(Value::i32(7), Value::Inst(typed));
    b.call("free", Ty::Void, vec![Value::Inst(raw)]);
    b.ret(Some(Value::i32(0)));

    let options = InstrumentOptions {
        precise: true,
        ..Default::default()
    };
    let lines = instrument_and_run(&mut module, options);
    assert_eq!(lines, vec!["p main 1 : freed"]);
}

fn node_module(name: &str) -> (Module, FunctionId) {
    let mut module = Module::new(name, &format!("{name}.c"));
    module.aggregates.insert(
        "Node".to_string(),
        Aggregate {
            name: Some("Node".to_string()),
            is_union: false,
            opaque: false,
            fields: vec![Ty::I32, Ty::ptr_to(Ty::Aggregate("Node".to_string()))],
        },
    );
    let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
    let node_ty = module.add_debug_type(DebugType::Composite {
        tag: dw::DW_TAG_structure_type.0,
        name: "Node".to_string(),
        base: None,
        dims: Vec::new(),
        members: Vec::new(),
        size_bits: 128,
    });
    let node_ptr = pointer_to(&mut module, node_ty);
    if let DebugType::Composite { members, .. } = &mut module.debug_types[node_ty] {
        members.push(DebugMember {
            name: "value".to_string(),
            ty: Some(int_ty),
            offset_bits: 0,
        });
        members.push(DebugMember {
            name: "next".to_string(),
            ty: Some(node_ptr),
            offset_bits: 64,
        });
    }
    let main = module.add_function(Function::new("main", Ty::I32));
    module.functions[main].add_block("entry");
    (module, main)
}

/// Two heap nodes pointing at each other: traversal terminates and each
/// node is printed exactly once per chase.
#[test]
fn cyclic_list_terminates_and_prints_each_node_once() {
    let (mut module, main) = node_module("s5");
    let node_ptr_debug = {
        // pointer-to-Node registered by node_module as the third type
        let ids: Vec<_> = module.debug_types.ids().collect();
        ids[2]
    };
    let a = local_var(&mut module, "a", "main", node_ptr_debug);
    let bvar = local_var(&mut module, "b", "main", node_ptr_debug);
    let entry = module.functions[main].entry.unwrap();
    let node_ptr_ty = Ty::ptr_to(Ty::Aggregate("Node".to_string()));

    let mut b = Builder::at(&mut module, main, entry, InsertPoint::BlockEnd);
    let a_raw = b.call("malloc", Ty::ptr_to(Ty::I8), vec![Value::i64(16)]);
    let a_node = b.cast(Value::Inst(a_raw), node_ptr_ty.clone());
    let b_raw = b.call("malloc", Ty::ptr_to(Ty::I8), vec![Value::i64(16)]);
    let b_node = b.cast(Value::Inst(b_raw), node_ptr_ty.clone());
    b.dbg_value(a, Value::Inst(a_node));
    b.dbg_value(bvar, Value::Inst(b_node));

    let a_value = b.field_addr(Value::Inst(a_node), 0, Ty::I32);
    b.store(Value::i32(1), Value::Inst(a_value));
    let a_next = b.field_addr(Value::Inst(a_node), 1, node_ptr_ty.clone());
    b.store(Value::Inst(b_node), Value::Inst(a_next));
    let b_value = b.field_addr(Value::Inst(b_node), 0, Ty::I32);
    b.store(Value::i32(2), Value::Inst(b_value));
    let b_next = b.field_addr(Value::Inst(b_node), 1, node_ptr_ty);
    b.store(Value::Inst(a_node), Value::Inst(b_next));
    b.ret(Some(Value::i32(0)));

    let options = InstrumentOptions {
        precise: true,
        full_heap: true,
        ..Default::default()
    };
    let lines = instrument_and_run(&mut module, options);
    assert_eq!(
        lines,
        vec![
            "a-value main 1 : 1",
            "a-next-value main 1 : 2",
            "b-value main 1 : 2",
            "b-next-value main 1 : 1",
            "Heap Data-value main 1 : 1",
            "Heap Data-next-value main 1 : 2",
        ]
    );
}

/// `struct S { int k; struct S* n; } s = {5, NULL};` as a local.
#[test]
fn struct_with_null_pointer_field() {
    let mut module = Module::new("s6", "s6.c");
    module.aggregates.insert(
        "S".to_string(),
        Aggregate {
            name: Some("S".to_string()),
            is_union: false,
            opaque: false,
            fields: vec![Ty::I32, Ty::ptr_to(Ty::Aggregate("S".to_string()))],
        },
    );
    let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
    let s_ty = module.add_debug_type(DebugType::Composite {
        tag: dw::DW_TAG_structure_type.0,
        name: "S".to_string(),
        base: None,
        dims: Vec::new(),
        members: Vec::new(),
        size_bits: 128,
    });
    let s_ptr = pointer_to(&mut module, s_ty);
    if let DebugType::Composite { members, .. } = &mut module.debug_types[s_ty] {
        members.push(DebugMember {
            name: "k".to_string(),
            ty: Some(int_ty),
            offset_bits: 0,
        });
        members.push(DebugMember {
            name: "n".to_string(),
            ty: Some(s_ptr),
            offset_bits: 64,
        });
    }
    let s = local_var(&mut module, "s", "main", s_ty);
    let main = module.add_function(Function::new("main", Ty::I32));
    let entry = module.functions[main].add_block("entry");
    let agg = Ty::Aggregate("S".to_string());
    let mut b = Builder::at(&mut module, main, entry, InsertPoint::BlockEnd);
    let slot = b.alloca(agg.clone(), "s");
    b.dbg_declare(s, Value::Inst(slot));
    let k_addr = b.field_addr(Value::Inst(slot), 0, Ty::I32);
    b.store(Value::i32(5), Value::Inst(k_addr));
    let n_addr = b.field_addr(Value::Inst(slot), 1, Ty::ptr_to(agg.clone()));
    b.store(Value::Null(Ty::ptr_to(agg)), Value::Inst(n_addr));
    b.ret(Some(Value::i32(0)));

    let options = InstrumentOptions {
        precise: true,
        ..Default::default()
    };
    let lines = instrument_and_run(&mut module, options);
    assert_eq!(lines, vec!["s-k main 1 : 5", "s-n main 1 : NULL"]);
}

/// Static scalars report under the `(Static)` scope of the observing
/// function.
#[test]
fn static_scalar_reports_with_static_scope() {
    let mut module = Module::new("statics", "statics.c");
    let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
    let g_var = module.add_debug_variable(DebugVariable {
        name: "g".to_string(),
        scope: String::new(),
        ty: Some(int_ty),
        artificial: false,
        kind: VariableKind::Global,
    });
    module.add_global(exitscope_ir::Global {
        name: "g".to_string(),
        ty: Ty::I32,
        init: Some(exitscope_ir::GlobalInit::Int(9)),
        constant: false,
        debug: Some(g_var),
    });
    let main = module.add_function(Function::new("main", Ty::I32));
    let entry = module.functions[main].add_block("entry");
    let mut b = Builder::at(&mut module, main, entry, InsertPoint::BlockEnd);
    b.ret(Some(Value::i32(0)));

    let lines = instrument_and_run(&mut module, InstrumentOptions::default());
    assert_eq!(lines, vec!["g (Static) main 1 : 9"]);
}

/// Call counters distinguish repeated executions of the same function.
#[test]
fn call_counters_increment_per_invocation() {
    let mut module = Module::new("counters", "counters.c");
    let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
    let y = local_var(&mut module, "y", "helper", int_ty);
    let helper = module.add_function(Function::new("helper", Ty::Void));
    let hentry = module.functions[helper].add_block("entry");
    {
        let mut b = Builder::at(&mut module, helper, hentry, InsertPoint::BlockEnd);
        b.dbg_value(y, Value::i32(7));
        b.ret(None);
    }
    let main = module.add_function(Function::new("main", Ty::I32));
    let entry = module.functions[main].add_block("entry");
    let mut b = Builder::at(&mut module, main, entry, InsertPoint::BlockEnd);
    b.call("helper", Ty::Void, vec![]);
    b.call("helper", Ty::Void, vec![]);
    b.ret(Some(Value::i32(0)));

    let lines = instrument_and_run(&mut module, InstrumentOptions::default());
    assert_eq!(lines, vec!["y helper 1 : 7", "y helper 2 : 7"]);
}

/// A call to `exit` gets its own observation point and transcript close.
#[test]
fn exit_calls_observe_before_halting() {
    let mut module = Module::new("halt", "halt.c");
    let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
    let x = local_var(&mut module, "x", "main", int_ty);
    let main = module.add_function(Function::new("main", Ty::I32));
    let entry = module.functions[main].add_block("entry");
    let mut b = Builder::at(&mut module, main, entry, InsertPoint::BlockEnd);
    b.dbg_value(x, Value::i32(5));
    b.call("exit", Ty::Void, vec![Value::i32(1)]);
    b.ret(Some(Value::i32(0)));

    let dir = tempfile::tempdir().unwrap();
    exitscope_compiler::run(&mut module, &InstrumentOptions::default(), dir.path()).unwrap();
    let mut vm = Vm::new(&module, dir.path()).unwrap();
    assert_eq!(vm.run().unwrap(), 1);
    let transcript =
        std::fs::read_to_string(dir.path().join(output_file_name(&module.source_file))).unwrap();
    assert_eq!(transcript, "x main 1 : 5\n");
}

/// Heap-table bookkeeping across malloc / in-place realloc / free.
#[test]
fn heap_table_tracks_counts_and_frees() {
    let mut module = Module::new("heapinv", "heapinv.c");
    let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
    let int_ptr = pointer_to(&mut module, int_ty);
    let p = local_var(&mut module, "p", "main", int_ptr);
    let q = local_var(&mut module, "q", "main", int_ptr);
    let main = module.add_function(Function::new("main", Ty::I32));
    let entry = module.functions[main].add_block("entry");
    let mut b = Builder::at(&mut module, main, entry, InsertPoint::BlockEnd);
    // p: three ints, later freed.
    let p_raw = b.call("malloc", Ty::ptr_to(Ty::I8), vec![Value::i64(12)]);
    let p_typed = b.cast(Value::Inst(p_raw), Ty::ptr_to(Ty::I32));
    b.dbg_value(p, Value::Inst(p_typed));
    // q: four ints, shrunk in place to two.
    let q_raw = b.call("malloc", Ty::ptr_to(Ty::I8), vec![Value::i64(16)]);
    let q_typed = b.cast(Value::Inst(q_raw), Ty::ptr_to(Ty::I32));
    b.dbg_value(q, Value::Inst(q_typed));
    let q_new = b.call("realloc", Ty::ptr_to(Ty::I8), vec![Value::Inst(q_raw), Value::i64(8)]);
    b.cast(Value::Inst(q_new), Ty::ptr_to(Ty::I32));
    b.call("free", Ty::Void, vec![Value::Inst(p_raw)]);
    b.ret(Some(Value::i32(0)));

    let dir = tempfile::tempdir().unwrap();
    let options = InstrumentOptions {
        precise: true,
        ..Default::default()
    };
    exitscope_compiler::run(&mut module, &options, dir.path()).unwrap();
    let mut vm = Vm::new(&module, dir.path()).unwrap();
    vm.run().unwrap();

    let session = vm.session().expect("type table opened");
    let addresses = session.heap.addresses();
    assert_eq!(addresses.len(), 2);
    let p_entry = session.heap.get(addresses[0]).unwrap();
    assert!(p_entry.freed);
    assert!(p_entry.data.is_none());
    let q_entry = session.heap.get(addresses[1]).unwrap();
    assert!(!q_entry.freed);
    assert_eq!(q_entry.data.unwrap().count, 2);
}
