// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `require` bootstrap and the host primitives behind it

use super::registry::{Builtin, Host};
use crate::convert;
use crate::loader::ScriptLoader;
use rquickjs::{qjs, Ctx, FromJs, Function, Object, Value};
use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;

/// Global holding materialized builtin values
pub const BUILTINS_GLOBAL: &str = "__builtins";

/// Global holding `{makeRequire, runMain}`
pub const LOADER_GLOBAL: &str = "__loader";

const PRELUDE: &str = r#"
var __hostError = function (name, message) {
  var err = new Error(message);
  err.name = name;
  return err;
};
var __builtins = {};
"#;

// `cached` selects instance memoization per resolved path. Without it every
// require re-executes the module body; the in-flight table still stops
// circular requires from recursing.
const BOOTSTRAP: &str = r#"
(function (resolve, load, cached) {
  var instances = {};
  var loading = {};
  var has = function (table, key) {
    return Object.prototype.hasOwnProperty.call(table, key);
  };

  function execute(module, loaded) {
    loaded.factory.call(
      module.exports,
      module.exports,
      makeRequire(loaded.dirname),
      module,
      loaded.filename,
      loaded.dirname
    );
    module.loaded = true;
    return module.exports;
  }

  function makeRequire(cwd) {
    var require = function (id) {
      if (typeof id !== 'string') {
        throw new TypeError('module id must be a string');
      }
      var path = resolve(cwd, id);
      if (cached && has(instances, path)) {
        return instances[path].exports;
      }
      if (has(loading, path)) {
        return loading[path].exports;
      }
      var loaded = load(path);
      if (loaded.isBuiltin) {
        return loaded.builtin;
      }
      var module = { id: path, filename: loaded.filename, exports: {}, loaded: false };
      loading[path] = module;
      if (cached) {
        instances[path] = module;
      }
      try {
        return execute(module, loaded);
      } catch (err) {
        if (cached) {
          delete instances[path];
        }
        throw err;
      } finally {
        delete loading[path];
      }
    };
    require.resolve = function (id) {
      return resolve(cwd, id);
    };
    return require;
  }

  function runMain(factory, filename, dirname) {
    var module = { id: '.', filename: filename, exports: {}, loaded: false };
    return execute(module, { factory: factory, filename: filename, dirname: dirname });
  }

  return { makeRequire: makeRequire, runMain: runMain };
})
"#;

/// Install the prelude, the host primitives and the global `require`
/// rooted at `root`
pub fn install<'js>(
    ctx: &Ctx<'js>,
    loader: &Arc<ScriptLoader>,
    host: &Host,
    cached: bool,
    root: &Path,
) -> rquickjs::Result<()> {
    ctx.eval::<(), _>(PRELUDE)?;

    let resolve = {
        let loader = Arc::clone(loader);
        let host = host.clone();
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, cwd: String, id: String| {
            resolve_id(&ctx, &loader, &host, &cwd, &id)
        })?
    };
    let load = {
        let loader = Arc::clone(loader);
        let host = host.clone();
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, path: String| {
            load_module(&ctx, &loader, &host, &path)
        })?
    };

    let bootstrap: Function = ctx.eval(BOOTSTRAP)?;
    let api: Object = bootstrap.call((resolve, load, cached))?;
    let make_require: Function = api.get("makeRequire")?;
    let require: Function = make_require.call((root.to_string_lossy().into_owned(),))?;

    let globals = ctx.globals();
    globals.set("require", require)?;
    globals.set(LOADER_GLOBAL, api)?;
    Ok(())
}

fn resolve_id<'js>(
    ctx: &Ctx<'js>,
    loader: &ScriptLoader,
    host: &Host,
    cwd: &str,
    id: &str,
) -> rquickjs::Result<String> {
    if host.is_builtin(id) {
        return Ok(id.to_string());
    }
    loader
        .resolve(Path::new(cwd), id)
        .map(|path| path.to_string_lossy().into_owned())
        .map_err(|err| convert::throw_error(ctx, "ModuleError", &err.to_string()))
}

fn load_module<'js>(
    ctx: &Ctx<'js>,
    loader: &ScriptLoader,
    host: &Host,
    path: &str,
) -> rquickjs::Result<Object<'js>> {
    let descriptor = Object::new(ctx.clone())?;
    if let Some(value) = materialize(ctx, host, path)? {
        descriptor.set("isBuiltin", true)?;
        descriptor.set("builtin", value)?;
        return Ok(descriptor);
    }

    let file = Path::new(path);
    let script = loader
        .load(file)
        .map_err(|err| convert::throw_error(ctx, "ModuleError", &err.to_string()))?;
    let factory: Function = eval_named(ctx, &script.factory, path)?;
    let dirname = file
        .parent()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default();

    descriptor.set("isBuiltin", false)?;
    descriptor.set("factory", factory)?;
    descriptor.set("filename", path)?;
    descriptor.set("dirname", dirname)?;
    Ok(descriptor)
}

/// Evaluate strict global code under `file_name`, so stack frames and
/// syntax errors point at the module rather than `eval_script`
pub fn eval_named<'js, V: FromJs<'js>>(ctx: &Ctx<'js>, source: &str, file_name: &str) -> rquickjs::Result<V> {
    let len = source.len();
    let source = CString::new(source)?;
    let file_name = CString::new(file_name)?;
    let flags = (qjs::JS_EVAL_TYPE_GLOBAL | qjs::JS_EVAL_FLAG_STRICT) as i32;
    // SAFETY: the context pointer is live for 'js, both strings outlive the
    // call, and JS_Eval returns an owned value.
    let value = unsafe {
        let raw = qjs::JS_Eval(ctx.as_raw().as_ptr(), source.as_ptr(), len as _, file_name.as_ptr(), flags);
        Value::from_raw(ctx.clone(), raw)
    };
    if value.is_exception() {
        return Err(rquickjs::Error::Exception);
    }
    V::from_js(ctx, value)
}

/// Value of builtin `id`, running its factory on first use
pub fn materialize<'js>(ctx: &Ctx<'js>, host: &Host, id: &str) -> rquickjs::Result<Option<Value<'js>>> {
    let table: Object = ctx.globals().get(BUILTINS_GLOBAL)?;
    if host.registry().is_materialized(id) {
        return table.get(id).map(Some);
    }
    let Some(factory) = host.registry().factory(id) else {
        return Ok(None);
    };
    tracing::debug!(id, "materializing builtin module");
    let value = factory.build(ctx, host)?;
    table.set(id, value.clone())?;
    host.registry_mut().mark_materialized(id.to_string());
    Ok(Some(value))
}

/// Register `builtin` under `id`, overwriting any earlier registration
pub fn install_builtin<'js>(ctx: &Ctx<'js>, host: &Host, id: String, builtin: Builtin) -> rquickjs::Result<()> {
    let table: Object = ctx.globals().get(BUILTINS_GLOBAL)?;
    let value = match builtin {
        Builtin::Factory(module) => {
            table.remove(id.as_str())?;
            host.registry_mut().register_factory(id, module);
            return Ok(());
        }
        Builtin::Data(json) => convert::json_to_js(ctx, &json)?,
        Builtin::Native(module) => module.build(ctx, host)?,
        Builtin::Opaque(object) => {
            host.registry_mut().set_opaque(id.clone(), object);
            Object::new(ctx.clone())?.into_value()
        }
    };
    table.set(id.as_str(), value)?;
    host.registry_mut().mark_materialized(id);
    Ok(())
}
