//! Integration tests for the class and converter registries

mod common;

use common::mock_helpers::register_idle;
use mediaflow_rs::frame::format::{BGR24, RGB24, RGBA32, Y8, YUV420P};
use mediaflow_rs::pipeline::{
    base_params, CancellationToken, Node, NodeInit, NodeIo, ParentHandle, RegistryContext,
    StepOutcome,
};
use mediaflow_rs::{MediaFlowError, ParamValue};
use std::sync::Arc;

fn init(class: &str, ctx: &RegistryContext) -> NodeInit {
    NodeInit::new(
        "n",
        class,
        ParentHandle::detached(CancellationToken::new()),
        ctx.modules().get_params(class).unwrap(),
    )
}

#[test]
fn test_builtins_are_listed_sorted() {
    let ctx = RegistryContext::with_builtins();
    let classes = ctx.modules().list_registered();
    for class in ["dummy", "frame_info", "null", "pattern", "rgb_swap", "rgb_to_y8"] {
        assert!(classes.contains(&class.to_string()), "missing {}", class);
    }
    let mut sorted = classes.clone();
    sorted.sort();
    assert_eq!(classes, sorted);
}

#[test]
fn test_duplicate_registration_keeps_first() {
    let ctx = RegistryContext::new();
    assert!(ctx.register_class("x", |_| Ok(Box::new(Nop) as Box<dyn Node>), || {
        base_params().with_description("first")
    }));
    assert!(!ctx.register_class("x", |_| Ok(Box::new(Nop) as Box<dyn Node>), || {
        base_params().with_description("second")
    }));
    assert_eq!(ctx.modules().get_params("x").unwrap().description(), "first");
}

struct Nop;

impl Node for Nop {
    fn step(&mut self, _io: &mut NodeIo) -> mediaflow_rs::Result<StepOutcome> {
        Ok(StepOutcome::Finished)
    }
}

#[test]
fn test_unknown_class() {
    let ctx = RegistryContext::with_builtins();
    assert!(matches!(
        ctx.modules().get_params("nope"),
        Err(MediaFlowError::UnknownClass(_))
    ));
    let init = NodeInit::new(
        "n",
        "nope",
        ParentHandle::detached(CancellationToken::new()),
        Default::default(),
    );
    assert!(matches!(
        ctx.modules().instantiate(init),
        Err(MediaFlowError::UnknownClass(_))
    ));
}

#[test]
fn test_factory_panic_becomes_init_failure() {
    let ctx = RegistryContext::new();
    ctx.register_class(
        "explodes",
        |_| -> mediaflow_rs::Result<Box<dyn Node>> { panic!("bad factory") },
        base_params,
    );
    let err = ctx.modules().instantiate(init("explodes", &ctx)).unwrap_err();
    assert!(matches!(err, MediaFlowError::InitializationFailed { .. }));

    // The registry is still usable
    register_idle(&ctx, "idle");
    assert!(ctx.modules().instantiate(init("idle", &ctx)).is_ok());
}

#[test]
fn test_params_are_independent_copies() {
    let ctx = RegistryContext::with_builtins();
    let mut params = ctx.modules().get_params("pattern").unwrap();
    params.set("fps", 5.0);
    let fresh = ctx.modules().get_params("pattern").unwrap();
    assert_eq!(fresh.value("fps"), Some(&ParamValue::Float(25.0)));
}

#[test]
fn test_converter_lookup() {
    let ctx = RegistryContext::with_builtins();
    let converters = ctx.converters();

    assert!(converters.is_converter_registered(RGB24, BGR24));
    assert!(!converters.is_converter_registered(Y8, RGB24));

    // Producer order wins over consumer order
    let choice = converters.find_converter(&[RGBA32, RGB24], &[Y8, BGR24]).unwrap();
    assert_eq!(choice.input, RGBA32);
    assert_eq!(choice.output, Y8);
    assert_eq!(choice.class_id, "rgb_to_y8");

    assert!(converters.find_converter(&[Y8], &[YUV420P]).is_none());
}

#[test]
fn test_registration_from_many_threads() {
    let ctx = Arc::new(RegistryContext::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                register_idle(&ctx, &format!("idle_{}", i));
                ctx.register_converter(
                    Y8,
                    RGB24,
                    "shared_conv",
                    |_| Ok(Box::new(Nop) as Box<dyn Node>),
                    base_params,
                )
            })
        })
        .collect();
    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&ok| ok)
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(ctx.modules().len(), 9);
    assert_eq!(ctx.converters().get_converters(Y8, RGB24).len(), 1);
}
