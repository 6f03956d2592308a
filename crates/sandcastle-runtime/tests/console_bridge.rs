//! End-to-end tests against a real QuickJS context.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sandcastle_core::{ConsoleLevel, ConsoleMessage};
use sandcastle_runtime::{ExecuteOptions, SandboxConfig, SandboxContext, SandboxError};

type Messages = Arc<Mutex<Vec<ConsoleMessage>>>;
type Errors = Arc<Mutex<Vec<SandboxError>>>;

async fn recording_context(config: SandboxConfig) -> (SandboxContext, Messages, Errors) {
    let context = SandboxContext::create(config).await.unwrap();

    let messages: Messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    context.on_console(move |meta, level, args| {
        sink.lock().push(ConsoleMessage {
            meta: meta.clone(),
            level,
            args: args.to_vec(),
        });
    });

    let errors: Errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    context.on_error(move |e| sink.lock().push(e.clone()));

    (context, messages, errors)
}

async fn run(code: &str) -> Vec<ConsoleMessage> {
    let (context, messages, errors) = recording_context(SandboxConfig::default()).await;
    context.execute(code, ExecuteOptions::default()).await.unwrap();
    assert!(errors.lock().is_empty());
    let messages = messages.lock().clone();
    messages
}

#[tokio::test]
async fn test_every_level_is_intercepted_with_cursor() {
    let (context, messages, _) = recording_context(SandboxConfig::default()).await;

    for level in ConsoleLevel::ALL {
        let code = format!("console.{level}('hello console');");
        let execution = context
            .execute(code, ExecuteOptions::with_cursor("cursor-identifier"))
            .await
            .unwrap();

        let last = messages.lock().last().cloned().unwrap();
        assert_eq!(last.level, level);
        assert_eq!(last.meta.reference_str(), Some("cursor-identifier"));
        assert_eq!(last.meta.execution, execution);
        assert_eq!(last.arg(0).as_str(), Some("hello console"));
    }
    assert_eq!(messages.lock().len(), ConsoleLevel::ALL.len());
}

#[tokio::test]
async fn test_all_datatypes_round_trip() {
    let messages = run(r#"
        function A () {
            this.key = 'value';
            return this;
        }

        var obj = {
            regex: /a-z/g,
            nil: null,
            undef: undefined,
            string: 'some str',
            number: 1234,
            boolean: true,
            date: new Date('2018-06-04T07:00:00.000Z'),
            buffer: Buffer.from('overflow'),
            arr: [1, 2, 3],
            obj: { a: 1, b: 2 },
            custom: new A(),
            inf: Infinity,
            neginf: -Infinity,
            map: new Map([[1, 'one'], [2, 'two']]),
            set: new Set([1, 2, 3]),
            int8Array: new Int8Array([1, 2, 3]),
            uint8Array: new Uint8Array([1, 2, 3]),
            uint8ClampedArray: new Uint8ClampedArray([1, 2, 3]),
            int16Array: new Int16Array([1, 2, 3]),
            uint16Array: new Uint16Array([1, 2, 3]),
            int32Array: new Int32Array([1, 2, 3]),
            uint32Array: new Uint32Array([1, 2, 3]),
            float32Array: new Float32Array([1, 2, 3]),
            float64Array: new Float64Array([1, 2, 3])
        };

        obj.circular = obj;

        console.log(obj, /a-z/g);
    "#)
    .await;

    assert_eq!(messages.len(), 1);
    let message = &messages[0];
    assert_eq!(message.level, ConsoleLevel::Log);
    assert_eq!(message.args.len(), 2);

    let obj = message.arg(0);
    assert_eq!(obj.get("regex").unwrap().as_regexp(), Some(("a-z", "g")));
    assert!(obj.get("nil").unwrap().is_null());
    assert!(obj.get("undef").unwrap().is_undefined());
    assert_eq!(obj.get("string").unwrap().as_str(), Some("some str"));
    assert_eq!(obj.get("number").unwrap().as_f64(), Some(1234.0));
    assert_eq!(obj.get("boolean").unwrap().as_bool(), Some(true));
    assert_eq!(obj.get("date").unwrap().as_date(), Some(1_528_095_600_000.0));
    assert_eq!(obj.get("buffer").unwrap().as_bytes(), Some(&b"overflow"[..]));
    assert_eq!(obj.get("inf").unwrap().as_f64(), Some(f64::INFINITY));
    assert_eq!(obj.get("neginf").unwrap().as_f64(), Some(f64::NEG_INFINITY));

    let arr = obj.get("arr").unwrap();
    assert_eq!(arr.len(), Some(3));
    assert_eq!(arr.index(2).unwrap().as_f64(), Some(3.0));

    let nested = obj.get("obj").unwrap();
    assert_eq!(nested.keys().unwrap(), vec!["a", "b"]);
    assert_eq!(nested.get("b").unwrap().as_f64(), Some(2.0));

    let custom = obj.get("custom").unwrap();
    assert_eq!(custom.keys().unwrap(), vec!["key"]);
    assert_eq!(custom.get("key").unwrap().as_str(), Some("value"));

    let map = obj.get("map").unwrap().map_entries().unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map[0].0.as_f64(), Some(1.0));
    assert_eq!(map[1].1.as_str(), Some("two"));

    let set = obj.get("set").unwrap();
    assert_eq!(set.len(), Some(3));
    assert_eq!(set.index(0).unwrap().as_f64(), Some(1.0));

    for (key, type_name) in [
        ("int8Array", "Int8Array"),
        ("uint8Array", "Uint8Array"),
        ("uint8ClampedArray", "Uint8ClampedArray"),
        ("int16Array", "Int16Array"),
        ("uint16Array", "Uint16Array"),
        ("int32Array", "Int32Array"),
        ("uint32Array", "Uint32Array"),
        ("float32Array", "Float32Array"),
        ("float64Array", "Float64Array"),
    ] {
        let view = obj.get(key).unwrap().as_typed_array().unwrap();
        assert_eq!(view.type_name(), type_name);
        assert_eq!(view.to_f64_vec(), vec![1.0, 2.0, 3.0]);
    }

    assert_eq!(obj.get("circular").unwrap().object_id(), obj.object_id());
    assert_eq!(message.arg(1).as_regexp(), Some(("a-z", "g")));
}

#[tokio::test]
async fn test_values_without_structure_are_named() {
    let messages = run(r#"
        console.log({
            func: function myFunc() {},
            anonFunc: function () {},
            genFunc: function* () {},
            weakmap: new WeakMap(),
            weakset: new WeakSet(),
            arraybuffers: new ArrayBuffer(28)
        }, function () {});
    "#)
    .await;

    let obj = messages[0].arg(0);
    let opaque = |key: &str| obj.get(key).unwrap().as_opaque().map(str::to_string);
    assert_eq!(opaque("func").as_deref(), Some("[Function: myFunc]"));
    assert_eq!(opaque("anonFunc").as_deref(), Some("[Function: anonFunc]"));
    assert_eq!(opaque("genFunc").as_deref(), Some("[GeneratorFunction: genFunc]"));
    assert_eq!(opaque("weakmap").as_deref(), Some("[WeakMap]"));
    assert_eq!(opaque("weakset").as_deref(), Some("[WeakSet]"));
    assert_eq!(
        opaque("arraybuffers").as_deref(),
        Some("[ArrayBuffer { byteLength: 28 }]")
    );
    assert_eq!(messages[0].arg(1).as_opaque(), Some("[Function]"));
}

#[tokio::test]
async fn test_tampered_constructor_metadata() {
    let messages = run(r#"
        var r = /a-z/;
        r.constructor = undefined;

        class c {};
        c.constructor.name = null;

        var d = new Date(0);
        delete Date.prototype.constructor;
        Object.defineProperty(d, 'constructor', { get() { throw new Error('trap'); } });

        console.log(r, c, d);
    "#)
    .await;

    let message = &messages[0];
    assert_eq!(message.arg(0).as_regexp(), Some(("a-z", "")));
    assert_eq!(message.arg(1).as_opaque(), Some("[Function: c]"));
    assert_eq!(message.arg(2).as_date(), Some(0.0));
}

#[tokio::test]
async fn test_brand_checks_ignore_prototype_swaps() {
    let messages = run(r#"
        var m = new Map([['k', 1]]);
        Object.setPrototypeOf(m, Array.prototype);
        var fake = Object.create(Map.prototype);
        console.log(m, fake);
    "#)
    .await;

    let entries = messages[0].arg(0).map_entries().unwrap();
    assert_eq!(entries[0].0.as_str(), Some("k"));
    assert_eq!(messages[0].arg(1).len(), Some(0));
    assert!(messages[0].arg(1).map_entries().is_none());
}

#[tokio::test]
async fn test_to_string_tag_does_not_change_kind() {
    let messages = run(r#"
        class Job {
            constructor() { this.id = 7; }
            get [Symbol.toStringTag]() { return 'Promise'; }
        }
        console.log(
            { a: 1, [Symbol.toStringTag]: 'DataView' },
            new Job(),
            new DataView(new ArrayBuffer(4)),
            Promise.resolve(1)
        );
    "#)
    .await;

    let message = &messages[0];
    assert_eq!(message.arg(0).keys(), Some(vec!["a"]));
    assert_eq!(message.arg(0).get("a").unwrap().as_f64(), Some(1.0));
    assert_eq!(message.arg(1).keys(), Some(vec!["id"]));
    assert_eq!(message.arg(1).get("id").unwrap().as_f64(), Some(7.0));
    assert_eq!(message.arg(2).as_opaque(), Some("[DataView]"));
    assert_eq!(message.arg(3).as_opaque(), Some("[Promise]"));
}

#[tokio::test]
async fn test_opaque_names_fall_back_to_builtin() {
    let messages = run(r#"
        var orphan = Object.setPrototypeOf(new WeakMap(), null);
        var ab = new ArrayBuffer(8);
        ab.constructor = 5;
        var ws = new WeakSet();
        Object.defineProperty(ws, 'constructor', { get() { throw new Error('trap'); } });
        var view = new DataView(new ArrayBuffer(1));
        view.constructor = { name: '' };
        console.log(orphan, ab, ws, view);
    "#)
    .await;

    let message = &messages[0];
    assert_eq!(message.arg(0).as_opaque(), Some("[WeakMap]"));
    assert_eq!(message.arg(1).as_opaque(), Some("[ArrayBuffer { byteLength: 8 }]"));
    assert_eq!(message.arg(2).as_opaque(), Some("[WeakSet]"));
    assert_eq!(message.arg(3).as_opaque(), Some("[DataView]"));
}

#[tokio::test]
async fn test_shared_reference_keeps_identity() {
    let messages = run(r#"
        var s = { n: 1 };
        console.log({ a: s, b: s, c: [s] });
    "#)
    .await;

    let root = messages[0].arg(0);
    let a = root.get("a").unwrap();
    let b = root.get("b").unwrap();
    let c = root.get("c").unwrap().index(0).unwrap();

    assert_eq!(a.get("n").unwrap().as_f64(), Some(1.0));
    assert_eq!(b.get("n").unwrap().as_f64(), Some(1.0));
    assert_eq!(a.object_id(), b.object_id());
    assert_eq!(a.object_id(), c.object_id());
    assert_ne!(a.object_id(), root.object_id());
    assert_eq!(
        messages[0].args[0].to_string(),
        "{ a: { n: 1 }, b: [Ref: Object], c: [ [Ref: Object] ] }"
    );
}

#[tokio::test]
async fn test_many_distinct_objects_encode_within_deadline() {
    let messages = run(r#"
        var items = [];
        for (var i = 0; i < 100000; i++) items.push({ i: i });
        console.log(items, 'tail');
    "#)
    .await;

    let list = messages[0].arg(0);
    assert_eq!(list.len(), Some(100_000));
    let last = list.index(99_999).unwrap();
    assert_eq!(last.get("i").unwrap().as_f64(), Some(99_999.0));
    assert_ne!(last.object_id(), list.index(0).unwrap().object_id());
    assert_eq!(messages[0].arg(1).as_str(), Some("tail"));
}

#[tokio::test]
async fn test_sparse_array_length_is_capped() {
    let messages = run(r#"
        var a = [1];
        a.length = 4294967295;
        console.log(a);
    "#)
    .await;

    let list = messages[0].arg(0);
    let cap = SandboxConfig::default().max_array_items;
    assert_eq!(list.len(), Some(cap + 1));
    assert_eq!(list.index(0).unwrap().as_f64(), Some(1.0));
    assert!(list.index(1).unwrap().is_undefined());
    let rest = 4_294_967_295 - cap as u64;
    assert_eq!(
        list.index(cap).unwrap().as_opaque(),
        Some(format!("... {rest} more items").as_str())
    );
}

#[tokio::test]
async fn test_nan_is_revived() {
    let messages = run("console.log(NaN, -0, 'NaN');").await;

    assert!(messages[0].arg(0).as_f64().unwrap().is_nan());
    let zero = messages[0].arg(1).as_f64().unwrap();
    assert!(zero == 0.0 && zero.is_sign_negative());
    assert_eq!(messages[0].arg(2).as_str(), Some("NaN"));
}

#[tokio::test]
async fn test_call_without_arguments() {
    let messages = run("console.log();").await;

    assert_eq!(messages.len(), 1);
    assert!(messages[0].args.is_empty());
    assert!(messages[0].arg(0).is_undefined());
}

#[tokio::test]
async fn test_function_reused_across_calls() {
    let (context, messages, _) = recording_context(SandboxConfig::default()).await;

    context
        .execute(
            "testLog = function () { console.log('from context 1'); };",
            ExecuteOptions::default(),
        )
        .await
        .unwrap();
    assert!(messages.lock().is_empty());

    let second = context
        .execute("testLog();", ExecuteOptions::with_cursor("second"))
        .await
        .unwrap();

    let messages = messages.lock();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].level, ConsoleLevel::Log);
    assert_eq!(messages[0].arg(0).as_str(), Some("from context 1"));
    assert_eq!(messages[0].meta.execution, second);
    assert_eq!(messages[0].meta.reference_str(), Some("second"));
}

#[tokio::test]
async fn test_snapshot_taken_at_call_site() {
    let messages = run(r#"
        var o = { n: 1 };
        o.self = o;
        console.log(o);
        o.n = 2;
        console.log(o);
    "#)
    .await;

    assert_eq!(messages[0].arg(0).get("n").unwrap().as_f64(), Some(1.0));
    assert_eq!(messages[1].arg(0).get("n").unwrap().as_f64(), Some(2.0));
}

#[tokio::test]
async fn test_unserializable_argument_keeps_siblings() {
    let messages = run(r#"
        var revocable = Proxy.revocable({}, {});
        revocable.revoke();
        var trap = { get boom() { throw new Error('nope'); } };
        console.log('before', revocable.proxy, trap, 'after');
    "#)
    .await;

    let message = &messages[0];
    assert_eq!(message.arg(0).as_str(), Some("before"));
    assert!(message.arg(1).as_opaque().unwrap().starts_with("[Unserializable"));
    let trapped = message.arg(2).as_opaque().unwrap();
    assert!(trapped.starts_with("[Unserializable") && trapped.contains("nope"), "{trapped}");
    assert_eq!(message.arg(3).as_str(), Some("after"));
}

#[tokio::test]
async fn test_primitives_without_structure() {
    let messages = run("console.log(Symbol('tag'), 10n, Buffer.from('é'));").await;

    let message = &messages[0];
    assert_eq!(message.arg(0).as_opaque(), Some("Symbol(tag)"));
    assert_eq!(message.arg(1).as_opaque(), Some("10n"));
    assert_eq!(message.arg(2).as_bytes(), Some(&[0xc3, 0xa9][..]));
}

#[tokio::test]
async fn test_deep_nesting_is_cut_off() {
    let messages = run(r#"
        var root = [];
        var current = root;
        for (var i = 0; i < 300; i++) {
            var next = [];
            current.push(next);
            current = next;
        }
        console.log(root);
    "#)
    .await;

    let mut view = messages[0].arg(0);
    for _ in 0..128 {
        view = view.index(0).unwrap();
    }
    assert_eq!(view.as_opaque(), Some("[Array]"));
}

#[tokio::test]
async fn test_async_logs_arrive_before_completion() {
    let messages = run(r#"
        Promise.resolve(7).then(function (n) { console.info('resolved', n); });
        console.log('sync');
    "#)
    .await;

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].arg(0).as_str(), Some("sync"));
    assert_eq!(messages[1].level, ConsoleLevel::Info);
    assert_eq!(messages[1].arg(1).as_f64(), Some(7.0));
}

#[tokio::test]
async fn test_script_error_keeps_delivered_events() {
    let (context, messages, errors) = recording_context(SandboxConfig::default()).await;

    let result = context
        .execute(
            "console.log('before'); throw new Error('boom');",
            ExecuteOptions::default(),
        )
        .await;

    match result {
        Err(SandboxError::Script { message, .. }) => assert_eq!(message, "boom"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(messages.lock().len(), 1);
    assert_eq!(messages.lock()[0].arg(0).as_str(), Some("before"));
    assert!(errors.lock().is_empty());
}

#[tokio::test]
async fn test_timeout_interrupts_and_context_survives() {
    let (context, messages, _) = recording_context(SandboxConfig::default()).await;

    let options = ExecuteOptions {
        timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let result = context.execute("while (true) {}", options).await;
    assert!(
        matches!(result, Err(SandboxError::Timeout { timeout_ms: 100, .. })),
        "{result:?}"
    );

    context
        .execute("console.log('alive');", ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(messages.lock()[0].arg(0).as_str(), Some("alive"));
}

#[tokio::test]
async fn test_deadline_expiring_inside_console_call() {
    let (context, messages, _) = recording_context(SandboxConfig::default()).await;

    let options = ExecuteOptions {
        timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let result = context
        .execute(
            r#"
            try {
                console.log({ get slow() { while (true) {} } }, 'x');
            } catch (e) {}
            console.log('after');
            "#,
            options,
        )
        .await;

    assert!(
        matches!(result, Err(SandboxError::Timeout { timeout_ms: 100, .. })),
        "{result:?}"
    );
    assert!(messages.lock().is_empty());
}

#[tokio::test]
async fn test_deadline_expiring_while_walking_large_array() {
    let config = SandboxConfig {
        max_array_items: 50_000_000,
        ..Default::default()
    };
    let (context, messages, _) = recording_context(config).await;

    let options = ExecuteOptions {
        timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let result = context
        .execute(
            "var a = []; a.length = 4294967295; console.log(a); console.log('after');",
            options,
        )
        .await;

    assert!(
        matches!(result, Err(SandboxError::Timeout { timeout_ms: 100, .. })),
        "{result:?}"
    );
    assert!(messages.lock().is_empty());
}

#[tokio::test]
async fn test_dispose_interrupts_running_script() {
    let config = SandboxConfig {
        timeout_ms: 0,
        ..Default::default()
    };
    let (context, _, errors) = recording_context(config).await;
    let context = Arc::new(context);

    let running = {
        let context = context.clone();
        tokio::spawn(async move {
            context
                .execute("while (true) {}", ExecuteOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    context.dispose();

    assert_eq!(running.await.unwrap(), Err(SandboxError::Disposed));
    assert_eq!(*errors.lock(), vec![SandboxError::Disposed]);
    assert_eq!(
        context
            .execute("console.log(1)", ExecuteOptions::default())
            .await,
        Err(SandboxError::Disposed)
    );
}

#[tokio::test]
async fn test_caller_supplied_execution_id() {
    let (context, messages, _) = recording_context(SandboxConfig::default()).await;

    let options = ExecuteOptions {
        id: Some("exec-42".to_string()),
        ..Default::default()
    };
    let execution = context.execute("console.warn('x')", options).await.unwrap();

    assert_eq!(execution.as_str(), "exec-42");
    let messages = messages.lock();
    assert_eq!(messages[0].meta.execution.as_str(), "exec-42");
    assert_eq!(messages[0].meta.reference, None);
}

#[tokio::test]
async fn test_contexts_share_no_state() {
    let (first, _, _) = recording_context(SandboxConfig::default()).await;
    let (second, _, _) = recording_context(SandboxConfig::default()).await;

    first
        .execute("var shared = 1;", ExecuteOptions::default())
        .await
        .unwrap();
    let result = second.execute("shared;", ExecuteOptions::default()).await;

    assert!(matches!(result, Err(SandboxError::Script { .. })));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let config = SandboxConfig {
        channel_capacity: 0,
        ..Default::default()
    };
    assert!(matches!(
        SandboxContext::create(config).await,
        Err(SandboxError::Config(_))
    ));
}
