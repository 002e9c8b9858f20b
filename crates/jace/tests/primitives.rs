use anyhow::Result;
use jace::jaxpr::{Atom, ClosedJaxpr, JaxprTracer, Param, Params, Traceable, Var};
use jace::{jit, DType, HostArray, JaceResult, Scalar, Value};

fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
    jace_backend_ref_cpu::register();
}

fn run<F: Traceable>(fun: F, args: Vec<Value>) -> Result<Vec<HostArray>> {
    setup();
    Ok(jit(fun).call(&args)?)
}

fn ints(shape: Vec<usize>, data: Vec<i64>) -> HostArray {
    HostArray::from_i64(shape, data).expect("valid int array")
}

fn floats(shape: Vec<usize>, data: Vec<f64>) -> HostArray {
    HostArray::from_f64(shape, data).expect("valid float array")
}

fn ints_param(values: &[i64]) -> Param {
    Param::Ints(values.to_vec())
}

#[test]
fn arithmetic_with_literals() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let doubled = t.binary("mul", &args[0], JaxprTracer::literal(Scalar::f64(2.0)))?;
        let shifted = t.binary("sub", &doubled, JaxprTracer::literal(Scalar::f64(1.0)))?;
        let root = t.unary("sqrt", &shifted, Params::new());
        Ok(vec![root.into()])
    }
    let out = run(f, vec![floats(vec![3], vec![1.0, 5.0, 12.5]).into()])?;
    assert_eq!(out[0].to_f64_vec(), vec![1.0, 3.0, 4.898979485566356]);
    Ok(())
}

#[test]
fn integer_pow_uses_its_exponent_parameter() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let params = Params::new().with("y", Param::Int(3));
        Ok(vec![t.unary("integer_pow", &args[0], params).into()])
    }
    let out = run(f, vec![ints(vec![4], vec![-2, 0, 1, 3]).into()])?;
    assert_eq!(out[0].to_i64_vec(), vec![-8, 0, 1, 27]);
    Ok(())
}

#[test]
fn comparisons_and_logical_operations() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let gt = t.binary("gt", &args[0], &args[1])?;
        let ne = t.binary("ne", &args[0], JaxprTracer::literal(Scalar::i64(2)))?;
        let both = t.binary("and", &gt, &ne)?;
        let negated = t.unary("not", &both, Params::new());
        let bits = t.binary("xor", &args[0], &args[1])?;
        Ok(vec![negated.into(), bits.into()])
    }
    let out = run(
        f,
        vec![
            ints(vec![4], vec![1, 2, 5, 7]).into(),
            ints(vec![4], vec![0, 1, 6, 3]).into(),
        ],
    )?;
    assert_eq!(out[0].to_bool_vec(), vec![false, true, true, false]);
    assert_eq!(out[1].to_i64_vec(), vec![1, 3, 3, 4]);
    Ok(())
}

#[test]
fn select_n_picks_cases_by_predicate() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let pred = t.binary("lt", &args[0], JaxprTracer::literal(Scalar::f64(0.0)))?;
        let neg = t.unary("neg", &args[0], Params::new());
        Ok(vec![t.select(&pred, vec![(&args[0]).into(), neg.into()])?.into()])
    }
    let out = run(f, vec![floats(vec![4], vec![-1.5, 2.0, 0.0, -3.0]).into()])?;
    assert_eq!(out[0].to_f64_vec(), vec![1.5, 2.0, 0.0, 3.0]);

    fn three_way(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let cases = vec![
            JaxprTracer::literal(Scalar::i64(10)),
            (&args[1]).into(),
            JaxprTracer::literal(Scalar::i64(30)),
        ];
        Ok(vec![t.select(&args[0], cases)?.into()])
    }
    let out = run(
        three_way,
        vec![
            HostArray::from_i32(vec![3], vec![2, 0, 1])?.into(),
            ints(vec![3], vec![7, 8, 9]).into(),
        ],
    )?;
    assert_eq!(out[0].to_i64_vec(), vec![30, 10, 9]);
    Ok(())
}

#[test]
fn convert_element_type_truncates_towards_zero() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let params = Params::new().with("new_dtype", Param::DType(DType::I32));
        let out = t.push(
            "convert_element_type",
            vec![(&args[0]).into()],
            vec![(args[0].shape().to_vec(), DType::I32)],
            params,
        );
        Ok(out.into_iter().map(Atom::from).collect())
    }
    let out = run(f, vec![floats(vec![3], vec![-1.7, 0.2, 2.9]).into()])?;
    assert_eq!(out[0].dtype(), DType::I32);
    assert_eq!(out[0].to_i64_vec(), vec![-1, 0, 2]);
    Ok(())
}

#[test]
fn iota_and_broadcast_in_dim() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let iota = t.push(
            "iota",
            vec![],
            vec![(vec![2, 3], DType::I64)],
            Params::new().with("dimension", Param::Int(1)),
        );
        let rows = t.push(
            "broadcast_in_dim",
            vec![(&args[0]).into()],
            vec![(vec![2, 3], DType::I64)],
            Params::new().with("broadcast_dimensions", ints_param(&[0])),
        );
        let sum = t.binary("add", &iota[0], &rows[0])?;
        Ok(vec![sum.into()])
    }
    let out = run(f, vec![ints(vec![2], vec![10, 20]).into()])?;
    assert_eq!(out[0].shape(), [2, 3]);
    assert_eq!(out[0].to_i64_vec(), vec![10, 11, 12, 20, 21, 22]);
    Ok(())
}

#[test]
fn slice_squeeze_and_reshape() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let sliced = t.push(
            "slice",
            vec![(&args[0]).into()],
            vec![(vec![1, 2], DType::F64)],
            Params::new()
                .with("start_indices", ints_param(&[1, 1]))
                .with("limit_indices", ints_param(&[2, 3]))
                .with("strides", Param::None),
        );
        let squeezed = t.push(
            "squeeze",
            vec![sliced[0].clone().into()],
            vec![(vec![2], DType::F64)],
            Params::new().with("dimensions", ints_param(&[0])),
        );
        let reshaped = t.push(
            "reshape",
            vec![(&args[0]).into()],
            vec![(vec![3, 2], DType::F64)],
            Params::new()
                .with("new_sizes", ints_param(&[3, 2]))
                .with("dimensions", Param::None),
        );
        Ok(vec![squeezed[0].clone().into(), reshaped[0].clone().into()])
    }
    let x = floats(vec![2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    let out = run(f, vec![x.into()])?;
    assert_eq!(out[0].to_f64_vec(), vec![4.0, 5.0]);
    assert_eq!(out[1].shape(), [3, 2]);
    assert_eq!(out[1].to_f64_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    Ok(())
}

#[test]
fn dynamic_slice_reads_runtime_offsets() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let out = t.push(
            "dynamic_slice",
            vec![
                (&args[0]).into(),
                (&args[1]).into(),
                JaxprTracer::literal(Scalar::i32(1)),
            ],
            vec![(vec![2, 2], DType::I64)],
            Params::new().with("slice_sizes", ints_param(&[2, 2])),
        );
        Ok(out.into_iter().map(Atom::from).collect())
    }
    let x = ints(vec![3, 3], (0..9).collect());
    let out = run(f, vec![x.into(), Scalar::i32(1).into()])?;
    assert_eq!(out[0].to_i64_vec(), vec![4, 5, 7, 8]);
    Ok(())
}

#[test]
fn concatenate_along_an_axis() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let out = t.push(
            "concatenate",
            vec![(&args[0]).into(), (&args[1]).into()],
            vec![(vec![2, 3], DType::I64)],
            Params::new().with("dimension", Param::Int(1)),
        );
        Ok(out.into_iter().map(Atom::from).collect())
    }
    let out = run(
        f,
        vec![
            ints(vec![2, 1], vec![1, 4]).into(),
            ints(vec![2, 2], vec![2, 3, 5, 6]).into(),
        ],
    )?;
    assert_eq!(out[0].to_i64_vec(), vec![1, 2, 3, 4, 5, 6]);
    Ok(())
}

#[test]
fn gather_rows() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let params = Params::new()
            .with("offset_dims", ints_param(&[1]))
            .with("collapsed_slice_dims", ints_param(&[0]))
            .with("start_index_map", ints_param(&[0]))
            .with("slice_sizes", ints_param(&[1, 3]))
            .with("mode", Param::Str("promise_in_bounds".into()));
        let out = t.push(
            "gather",
            vec![(&args[0]).into(), (&args[1]).into()],
            vec![(vec![2, 3], DType::F64)],
            params,
        );
        Ok(out.into_iter().map(Atom::from).collect())
    }
    let table = floats(vec![4, 3], (0..12).map(f64::from).collect());
    let rows = HostArray::from_i32(vec![2, 1], vec![3, 1])?;
    let out = run(f, vec![table.into(), rows.into()])?;
    assert_eq!(out[0].to_f64_vec(), vec![9.0, 10.0, 11.0, 3.0, 4.0, 5.0]);
    Ok(())
}

fn branch(primitive: &'static str) -> Result<ClosedJaxpr> {
    let mut t = JaxprTracer::new();
    let x = t.invar(vec![3], DType::F64);
    let y = t.unary(primitive, &x, Params::new());
    Ok(t.finish(vec![y.into()])?)
}

#[test]
fn cond_runs_the_selected_branch() -> Result<()> {
    struct Switch {
        branches: Vec<ClosedJaxpr>,
    }
    impl Traceable for Switch {
        fn make_jaxpr(&self, args: &[jace::cache::ArgDescriptor]) -> JaceResult<ClosedJaxpr> {
            let mut t = JaxprTracer::new();
            let index = t.invar(args[0].shape.clone(), args[0].dtype);
            let x = t.invar(args[1].shape.clone(), args[1].dtype);
            let out = t.push(
                "cond",
                vec![index.into(), x.into()],
                vec![(vec![3], DType::F64)],
                Params::new().with("branches", Param::Jaxprs(self.branches.clone())),
            );
            t.finish(out.into_iter().map(Atom::from).collect())
        }
    }

    setup();
    let wrapped = jit(Switch {
        branches: vec![branch("neg")?, branch("abs")?, branch("floor")?],
    });
    let x = floats(vec![3], vec![-1.5, 2.25, -0.5]);
    let expected = [
        vec![1.5, -2.25, 0.5],
        vec![1.5, 2.25, 0.5],
        vec![-2.0, 2.0, -1.0],
    ];
    for (selector, expected) in expected.iter().enumerate() {
        let out = wrapped.call(&[Scalar::i32(selector as i32).into(), x.clone().into()])?;
        assert_eq!(&out[0].to_f64_vec(), expected);
    }

    let lowered = wrapped.lower(&[Scalar::i32(0).into(), x.into()])?;
    let labels: Vec<String> = lowered
        .as_sdfg()
        .states()
        .map(|(_, state)| state.label.clone())
        .collect();
    assert!(labels.iter().any(|l| l.ends_with("_join")), "{labels:?}");
    assert!(labels.iter().any(|l| l.ends_with("_state_branch_2")), "{labels:?}");
    Ok(())
}

#[test]
fn cond_rejects_boolean_selectors() -> Result<()> {
    let neg = branch("neg")?;
    let abs = branch("abs")?;
    let mut t = JaxprTracer::new();
    let pred = t.invar(vec![], DType::Bool);
    let x = t.invar(vec![3], DType::F64);
    let out = t.push(
        "cond",
        vec![pred.into(), x.into()],
        vec![(vec![3], DType::F64)],
        Params::new().with("branches", Param::Jaxprs(vec![neg, abs])),
    );
    let jaxpr = t.finish(out.into_iter().map(Atom::from).collect())?;
    let err = jace::translator::TranslationBuilder::new(
        jace::translator::PrimitiveTranslatorRegistry::with_builtins(),
    )
    .translate(&jaxpr, None)
    .unwrap_err();
    assert!(err.is_unsupported(), "{err}");
    Ok(())
}

#[test]
fn pjit_embeds_a_nested_sdfg() -> Result<()> {
    struct Outer {
        inner: ClosedJaxpr,
    }
    impl Traceable for Outer {
        fn make_jaxpr(&self, args: &[jace::cache::ArgDescriptor]) -> JaceResult<ClosedJaxpr> {
            let mut t = JaxprTracer::new();
            let x = t.invar(args[0].shape.clone(), args[0].dtype);
            let y = t.invar(args[1].shape.clone(), args[1].dtype);
            let called = t.push(
                "pjit",
                vec![(&x).into(), (&y).into()],
                vec![(vec![2], DType::F64)],
                Params::new()
                    .with("jaxpr", Param::Jaxpr(self.inner.clone()))
                    .with("name", Param::Str("inner fun".into())),
            );
            let out = t.binary("add", &called[0], &x)?;
            t.finish(vec![out.into()])
        }
    }

    let mut t = JaxprTracer::new();
    let a = t.invar(vec![2], DType::F64);
    let b = t.invar(vec![2], DType::F64);
    let prod = t.binary("mul", &a, &b)?;
    let inner = t.finish(vec![prod.into()])?;

    setup();
    let wrapped = jit(Outer { inner });
    let args: Vec<Value> = vec![
        floats(vec![2], vec![1.0, 2.0]).into(),
        floats(vec![2], vec![3.0, 4.0]).into(),
    ];
    let out = wrapped.call(&args)?;
    assert_eq!(out[0].to_f64_vec(), vec![4.0, 10.0]);

    let lowered = wrapped.lower(&args)?;
    let nested: Vec<String> = lowered
        .as_sdfg()
        .states()
        .flat_map(|(_, state)| state.nodes.iter())
        .filter_map(|node| match node {
            jace::sdfg::DataflowNode::Nested(nested) => Some(nested.label.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(nested.len(), 1);
    assert!(nested[0].starts_with("pjit_inner_fun__"), "{nested:?}");
    Ok(())
}

#[test]
fn pjit_with_shardings_is_unsupported() -> Result<()> {
    fn f(t: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        let mut inner = JaxprTracer::new();
        let x = inner.invar(vec![2], DType::F64);
        let inner = inner.finish(vec![x.into()])?;
        let out = t.push(
            "pjit",
            vec![(&args[0]).into()],
            vec![(vec![2], DType::F64)],
            Params::new()
                .with("jaxpr", Param::Jaxpr(inner))
                .with("in_shardings", Param::Str("replicated".into())),
        );
        Ok(out.into_iter().map(Atom::from).collect())
    }
    setup();
    let err = jit(f)
        .lower(&[floats(vec![2], vec![1.0, 2.0]).into()])
        .unwrap_err();
    assert!(err.is_unsupported(), "{err}");
    Ok(())
}
