//! Sandbox runtime tests.
//!
//! The capability registration script and the mount supervisor are shipped
//! as JavaScript, so they are exercised here under V8. Each case assembles a
//! real host document, lifts its data blocks, and runs the two scripts against
//! a small stand-in for the browsing context: a DOM with just the calls the
//! scripts make, a manually drained clock, and React/ReactDOM/Babel stubs that
//! render to a string. There is no `MutationObserver`, so verification always
//! takes the poll path.

#[cfg(test)]
mod tests {
    use deno_core::{JsRuntime, RuntimeOptions};
    use serde_json::Value;

    use crate::capability::{catalog, REGISTRATION_SCRIPT};
    use crate::document::{BOOT_DATA_ID, CAPABILITY_DATA_ID, MODULE_DATA_ID};
    use crate::supervisor::{transition_table, MountPhase, SUPERVISOR_SCRIPT};
    use crate::{render_preview_with, PreviewOptions, CONVENTIONAL_NAMES};

    const HOST: &str = r#"
(function () {
  var g = globalThis;
  g.window = g;

  // ═══ clock ═══

  var now = 0;
  var seq = 0;
  var timers = [];
  g.setTimeout = function (fn, ms) {
    timers.push({ at: now + (ms || 0), seq: ++seq, fn: fn });
    return seq;
  };
  g.clearTimeout = function () {};

  var logs = { log: [], info: [], warn: [], error: [] };
  g.console = {
    log: function (m) { logs.log.push(String(m)); },
    info: function (m) { logs.info.push(String(m)); },
    warn: function (m) { logs.warn.push(String(m)); },
    error: function (m) { logs.error.push(String(m)); }
  };

  var errorListeners = [];
  g.addEventListener = function (type, fn) {
    if (type === "error") errorListeners.push(fn);
  };
  g.removeEventListener = function (type, fn) {
    var i = errorListeners.indexOf(fn);
    if (i >= 0) errorListeners.splice(i, 1);
  };
  function dispatchError(err) {
    var event = {
      error: err,
      message: String(err && err.message ? err.message : err),
      preventDefault: function () {}
    };
    errorListeners.slice().forEach(function (fn) { fn(event); });
  }

  // ═══ dom ═══

  var nudges = 0;
  var scripts = [];
  var blocks = {};

  function Element(tag) {
    this.tagName = tag.toUpperCase();
    this.attributes = {};
    this.children = [];
    this.parentNode = null;
    this.style = {};
    this.id = "";
    this.className = "";
    this.type = "";
    this.text = "";
    this.textContent = "";
    this.innerHTML = "";
  }
  Element.prototype.setAttribute = function (name, value) {
    this.attributes[name] = String(value);
  };
  Element.prototype.getAttribute = function (name) {
    return Object.prototype.hasOwnProperty.call(this.attributes, name) ? this.attributes[name] : null;
  };
  Element.prototype.appendChild = function (child) {
    child.parentNode = this;
    this.children.push(child);
    if (child.getAttribute("aria-hidden") === "true") nudges++;
    if (child.tagName === "SCRIPT") loadScript(child);
    return child;
  };
  Element.prototype.removeChild = function (child) {
    var i = this.children.indexOf(child);
    if (i >= 0) this.children.splice(i, 1);
    child.parentNode = null;
    return child;
  };

  function execute(code) {
    try {
      (0, eval)(code);
    } catch (err) {
      dispatchError(err);
    }
  }

  function loadScript(script) {
    var code = script.text || script.textContent;
    scripts.push({ type: script.type, presets: script.getAttribute("data-presets"), code: code });
    // typed scripts wait for the script-tag compiler
    if (!script.type) execute(code);
  }

  var body = new Element("body");
  var mountPoint = null;
  var phases = [];

  function find(node, id) {
    if (node.id === id) return node;
    for (var i = 0; i < node.children.length; i++) {
      var hit = find(node.children[i], id);
      if (hit) return hit;
    }
    return null;
  }

  g.document = {
    body: body,
    documentElement: {
      setAttribute: function (name, value) {
        if (name === "data-preview-phase") phases.push(value);
      }
    },
    createElement: function (tag) {
      return new Element(tag);
    },
    getElementById: function (id) {
      if (Object.prototype.hasOwnProperty.call(blocks, id)) return { textContent: blocks[id] };
      return find(body, id);
    }
  };

  // ═══ react ═══

  var ELEMENT = Symbol.for("react.element");
  var FORWARD_REF = Symbol.for("react.forward_ref");
  var PROVIDER = Symbol.for("react.provider");

  function Component(props) {
    this.props = props;
  }

  var React = {
    Fragment: Symbol.for("react.fragment"),
    Component: Component,
    createElement: function (type, props) {
      var merged = Object.assign({}, props);
      var kids = Array.prototype.slice.call(arguments, 2);
      if (kids.length === 1) merged.children = kids[0];
      else if (kids.length > 1) merged.children = kids;
      return { $$typeof: ELEMENT, type: type, props: merged };
    },
    forwardRef: function (render) {
      return { $$typeof: FORWARD_REF, render: render };
    },
    createContext: function (value) {
      var context = { current: value };
      context.Provider = { $$typeof: PROVIDER, context: context };
      return context;
    },
    useState: function (initial) {
      return [initial, function () {}];
    },
    useContext: function (context) {
      return context.current;
    },
    useEffect: function () {},
    useMemo: function (fn) {
      return fn();
    },
    useCallback: function (fn) {
      return fn;
    },
    useRef: function (value) {
      return { current: value };
    },
    memo: function (component) {
      return component;
    },
    isValidElement: function (value) {
      return !!value && value.$$typeof === ELEMENT;
    },
    cloneElement: function (element, extra) {
      return { $$typeof: ELEMENT, type: element.type, props: Object.assign({}, element.props, extra) };
    }
  };

  function attributes(props) {
    return Object.keys(props)
      .filter(function (key) {
        var value = props[key];
        return key !== "children" && key !== "key" && key !== "ref" &&
          value != null && typeof value !== "function" && typeof value !== "object";
      })
      .map(function (key) {
        return " " + (key === "className" ? "class" : key) + "=\"" + String(props[key]) + "\"";
      })
      .join("");
  }

  function renderNode(node) {
    if (node == null || typeof node === "boolean") return "";
    if (typeof node === "string" || typeof node === "number") return String(node);
    if (Array.isArray(node)) return node.map(renderNode).join("");
    var type = node.type;
    var props = node.props;
    if (type === React.Fragment) return renderNode(props.children);
    if (typeof type === "string") {
      return "<" + type + attributes(props) + ">" + renderNode(props.children) + "</" + type + ">";
    }
    if (type && type.$$typeof === FORWARD_REF) return renderNode(type.render(props, null));
    if (type && type.$$typeof === PROVIDER) {
      var previous = type.context.current;
      type.context.current = props.value;
      try {
        return renderNode(props.children);
      } finally {
        type.context.current = previous;
      }
    }
    if (typeof type === "function" && type.prototype && typeof type.prototype.render === "function") {
      var instance = new type(props);
      try {
        return renderNode(instance.render());
      } catch (err) {
        if (typeof type.getDerivedStateFromError !== "function") throw err;
        instance.state = Object.assign({}, instance.state, type.getDerivedStateFromError(err));
        if (typeof instance.componentDidCatch === "function") instance.componentDidCatch(err);
        return renderNode(instance.render());
      }
    }
    if (typeof type === "function") return renderNode(type(props));
    throw new TypeError("element type is invalid: " + String(type));
  }

  var ReactDOM = {
    createRoot: function (container) {
      return {
        render: function (element) {
          container.innerHTML = renderNode(element);
        }
      };
    },
    flushSync: function (fn) {
      fn();
    }
  };

  // ═══ compilers ═══

  // Only plain JavaScript goes through; JSX is a syntax error.
  var transformCompiler = {
    transform: function (source) {
      var at = source.search(/<[A-Za-z]/);
      if (at >= 0) throw new SyntaxError("Unexpected token '<' at offset " + at);
      return { code: source };
    }
  };

  var scriptTagCompiler = {
    transformScriptTags: function () {
      body.children.forEach(function (child) {
        if (child.tagName === "SCRIPT" && child.type === "text/babel" && !child.compiled) {
          child.compiled = true;
          execute(child.textContent);
        }
      });
    }
  };

  g.__host = {
    setup: function (mountId, compiler, predefined) {
      mountPoint = new Element("div");
      mountPoint.id = mountId;
      body.appendChild(mountPoint);
      g.React = React;
      g.ReactDOM = ReactDOM;
      g.Babel = compiler === "scriptTags" ? scriptTagCompiler : transformCompiler;
      predefined.forEach(function (name) {
        g[name] = function () { return "host"; };
      });
    },
    block: function (id, text) {
      blocks[id] = text;
    },
    drain: function () {
      for (var guard = 0; timers.length && guard < 1000; guard++) {
        timers.sort(function (a, b) { return a.at - b.at || a.seq - b.seq; });
        var next = timers.shift();
        now = next.at;
        try {
          next.fn();
        } catch (err) {
          dispatchError(err);
        }
      }
    },
    report: function () {
      var state = g.__PREVIEW_STATE__ || {};
      var registry = g.__PREVIEW_REGISTRY__ || {};
      return JSON.stringify({
        phases: phases,
        attempts: state.attempts || [],
        located: state.located || null,
        diagnostic: state.diagnostic || null,
        nudges: nudges,
        mountHtml: mountPoint ? mountPoint.innerHTML : null,
        scripts: scripts,
        skipped: registry.skipped || [],
        installed: Object.keys(registry.capabilities || {}),
        elapsedMs: now,
        logs: logs
      });
    }
  };
})();
"#;

    #[derive(Debug, Clone, Copy)]
    enum Compiler {
        /// `Babel.transform` is available and compiles synchronously.
        Transform,
        /// Only the script-tag compiler is loaded.
        ScriptTags,
    }

    fn json(value: impl serde::Serialize) -> String {
        serde_json::to_string(&value).unwrap()
    }

    fn data_block<'h>(html: &'h str, id: &str) -> &'h str {
        let open = format!("id=\"{}\">", id);
        let start = html.find(&open).unwrap() + open.len();
        let end = start + html[start..].find("</script>").unwrap();
        &html[start..end]
    }

    fn exec(runtime: &mut JsRuntime, name: &'static str, code: String) {
        if let Err(err) = runtime.execute_script(name, code) {
            panic!("{} threw: {}", name, err);
        }
    }

    /// Renders `source`, boots the document in a fresh isolate and returns
    /// what the sandbox observed once every timer has fired.
    fn boot(source: &str, compiler: Compiler, predefined: &[&str]) -> Value {
        let options = PreviewOptions::default();
        let html = render_preview_with(source, &options).unwrap();

        let mut runtime = JsRuntime::new(RuntimeOptions::default());
        exec(&mut runtime, "<host>", HOST.to_string());
        let mode = match compiler {
            Compiler::Transform => "transform",
            Compiler::ScriptTags => "scriptTags",
        };
        exec(
            &mut runtime,
            "<setup>",
            format!("__host.setup({}, {}, {});", json(&options.mount_id), json(mode), json(predefined)),
        );
        for id in [CAPABILITY_DATA_ID, MODULE_DATA_ID, BOOT_DATA_ID] {
            exec(
                &mut runtime,
                "<block>",
                format!("__host.block({}, {});", json(id), json(data_block(&html, id))),
            );
        }
        exec(&mut runtime, "<capabilities>", REGISTRATION_SCRIPT.to_string());
        exec(&mut runtime, "<supervisor>", SUPERVISOR_SCRIPT.to_string());
        exec(&mut runtime, "<drain>", "__host.drain();".to_string());

        let report = runtime
            .execute_script("<report>", "__host.report()".to_string())
            .unwrap();
        let scope = &mut runtime.handle_scope();
        let local = deno_core::v8::Local::new(scope, &report);
        serde_json::from_str(&local.to_rust_string_lossy(scope)).unwrap()
    }

    /// Observed phases, checked step by step against the transition table the
    /// document carries.
    fn phases(report: &Value) -> Vec<MountPhase> {
        let observed: Vec<MountPhase> = serde_json::from_value(report["phases"].clone()).unwrap();
        let table = transition_table();
        let mut from = MountPhase::Idle;
        for &to in &observed {
            assert!(
                table.iter().any(|tr| tr.from == from && tr.to == to),
                "{:?} -> {:?} is not a legal transition",
                from,
                to
            );
            from = to;
        }
        observed
    }

    const RENDERS_BUTTON: &str =
        "export default function Foo() {\n  return React.createElement(Button, null, \"Go\");\n}\n";

    // ═══════════════════════════════════════════════════════════════════════════════
    // MOUNT OUTCOMES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_visible_render_is_verified() {
        let report = boot(RENDERS_BUTTON, Compiler::Transform, &[]);
        assert_eq!(
            phases(&report),
            vec![
                MountPhase::Compiling,
                MountPhase::Locating,
                MountPhase::Mounted,
                MountPhase::Verifying,
                MountPhase::Verified,
            ]
        );
        assert_eq!(report["located"]["name"], "Foo");
        assert_eq!(report["located"]["strategy"], "candidate");
        let html = report["mountHtml"].as_str().unwrap();
        assert!(html.starts_with("<button"), "{}", html);
        assert!(html.contains("data-slot=\"button\""));
        assert!(html.contains(">Go</button>"));
        assert_eq!(report["attempts"].as_array().unwrap().len(), 0);
        assert_eq!(report["nudges"], 1);
        assert!(report["diagnostic"].is_null());
    }

    #[test]
    fn test_empty_render_stalls_after_every_attempt() {
        let src = "export default function Foo() {\n  return null;\n}\n";
        let report = boot(src, Compiler::Transform, &[]);
        assert_eq!(phases(&report).last(), Some(&MountPhase::Stalled));
        assert!(!phases(&report).contains(&MountPhase::Failed));

        let delays = PreviewOptions::default().verify_delays_ms;
        let attempts = report["attempts"].as_array().unwrap();
        assert_eq!(attempts.len(), delays.len());
        for (i, attempt) in attempts.iter().enumerate() {
            assert_eq!(attempt["attemptNumber"], i as u64 + 1);
            assert_eq!(attempt["delayMs"], delays[i]);
            assert_eq!(attempt["success"], false);
        }
        // one nudge when verification starts, then one per poll
        assert_eq!(report["nudges"], delays.len() as u64 + 1);
        assert!(report["elapsedMs"].as_u64().unwrap() >= delays.iter().map(|&d| d as u64).sum::<u64>());
        assert_eq!(report["diagnostic"]["kind"], "stalled");
    }

    #[test]
    fn test_missing_entry_point_lists_defined_names() {
        // Nothing is function-declared and `Widget` is not a function expression,
        // so no candidate is recorded and the text scan finds nothing.
        let src = "const parts = { Widget: () => \"w\" };\nexport const Widget = parts.Widget;\n";
        let report = boot(src, Compiler::Transform, &[]);
        assert_eq!(
            phases(&report),
            vec![
                MountPhase::Compiling,
                MountPhase::Locating,
                MountPhase::LocateFailed,
                MountPhase::Failed,
            ]
        );
        let diagnostic = &report["diagnostic"];
        assert_eq!(diagnostic["kind"], "locate");
        assert_eq!(diagnostic["lines"][0], format!("Tried: {}", CONVENTIONAL_NAMES.join(", ")));
        assert_eq!(diagnostic["lines"][1], "Defined in scope: Widget");
        assert_eq!(report["mountHtml"], "");
    }

    #[test]
    fn test_render_exception_fails() {
        let src = "export default function Foo() {\n  throw new Error(\"boom\");\n}\n";
        let report = boot(src, Compiler::Transform, &[]);
        assert_eq!(
            phases(&report),
            vec![MountPhase::Compiling, MountPhase::Locating, MountPhase::Failed]
        );
        assert_eq!(report["diagnostic"]["kind"], "exception");
        assert_eq!(report["diagnostic"]["lines"][0], "boom");
        assert_eq!(report["attempts"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_compile_error_fails_before_locating() {
        let src = "export default function Foo() {\n  return <div>hi</div>;\n}\n";
        let report = boot(src, Compiler::Transform, &[]);
        assert_eq!(phases(&report), vec![MountPhase::Compiling, MountPhase::Failed]);
        assert_eq!(report["diagnostic"]["kind"], "exception");
        let line = report["diagnostic"]["lines"][0].as_str().unwrap();
        assert!(line.contains("Unexpected token"), "{}", line);
        assert!(report["located"].is_null());
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // COMPILE FALLBACK
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_script_tag_fallback_compiles_typescript() {
        let report = boot(RENDERS_BUTTON, Compiler::ScriptTags, &[]);
        let scripts = report["scripts"].as_array().unwrap();
        let tagged = scripts.iter().find(|s| s["type"] == "text/babel").unwrap();
        let presets: Vec<&str> = tagged["presets"].as_str().unwrap().split(',').collect();
        assert!(presets.contains(&"typescript"));
        assert!(presets.contains(&"react"));

        assert_eq!(phases(&report).last(), Some(&MountPhase::Verified));
        let settle = PreviewOptions::default().settle_delay_ms as u64;
        assert!(report["elapsedMs"].as_u64().unwrap() >= settle);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // CAPABILITY REGISTRATION
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_catalog_installs_beside_engine_globals() {
        let src = "export default function Foo() {\n  return React.createElement(MapIcon, { size: 16 });\n}\n";
        let report = boot(src, Compiler::Transform, &[]);
        assert_eq!(report["skipped"].as_array().unwrap().len(), 0);
        let installed: Vec<&str> = report["installed"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        for name in catalog().names() {
            assert!(installed.contains(&name), "{} was not installed", name);
        }

        let html = report["mountHtml"].as_str().unwrap();
        assert!(html.starts_with("<svg"), "{}", html);
        assert!(html.contains("data-icon=\"MapIcon\""));
        assert!(html.contains("width=\"16\""));
        assert_eq!(phases(&report).last(), Some(&MountPhase::Verified));
    }

    #[test]
    fn test_existing_global_is_left_alone() {
        let src = "export default function Foo() {\n  return React.createElement(Badge, null, \"new\");\n}\n";
        let report = boot(src, Compiler::Transform, &["Badge"]);
        assert_eq!(report["skipped"], serde_json::json!(["Badge"]));
        let installed = report["installed"].as_array().unwrap();
        assert!(!installed.iter().any(|n| n == "Badge"));
        // the host's own Badge renders, not the catalog one
        assert_eq!(report["mountHtml"], "host");
    }
}
