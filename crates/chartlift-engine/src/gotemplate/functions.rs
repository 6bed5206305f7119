//! Helm and sprig template functions
//!
//! Functions that need the executing template (`include`, `tpl`, `and`,
//! `or`) live in the executor; everything else is a plain function over
//! evaluated arguments, dispatched through [`FUNCTIONS`].

use base64::Engine as _;
use phf::phf_map;
use regex::Regex;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use super::value::{
    compare, deep_merge, equal, format_float, from_f64, kind_of, merge_missing, print, to_f64,
    to_i64, to_str, truth, type_of,
};

pub type FuncResult = Result<Value, String>;
pub type Builtin = fn(&[Value]) -> FuncResult;

/// Functions that update the map passed as their first argument
pub const MUTATING: &[&str] = &[
    "set",
    "unset",
    "merge",
    "mergeOverwrite",
    "mustMerge",
    "mustMergeOverwrite",
];

pub static FUNCTIONS: phf::Map<&'static str, Builtin> = phf_map! {
    // Strings
    "quote" => quote,
    "squote" => squote,
    "upper" => upper,
    "lower" => lower,
    "title" => title,
    "untitle" => untitle,
    "trim" => trim,
    "trimAll" => trim_all,
    "trimPrefix" => trim_prefix,
    "trimSuffix" => trim_suffix,
    "trunc" => trunc,
    "abbrev" => abbrev,
    "replace" => replace,
    "contains" => contains,
    "hasPrefix" => has_prefix,
    "hasSuffix" => has_suffix,
    "repeat" => repeat,
    "substr" => substr,
    "nospace" => nospace,
    "cat" => cat,
    "indent" => indent,
    "nindent" => nindent,
    "printf" => printf,
    "print" => print_fn,
    "println" => println_fn,
    "toString" => to_string,
    "toStrings" => to_strings,
    "split" => split,
    "splitList" => split_list,
    "join" => join,
    "camelcase" => camelcase,
    "snakecase" => snakecase,
    "kebabcase" => kebabcase,
    "b64enc" => b64enc,
    "b64dec" => b64dec,
    "sha256sum" => sha256sum,
    "regexMatch" => regex_match,
    "mustRegexMatch" => regex_match,
    "regexFind" => regex_find,
    "regexFindAll" => regex_find_all,
    "regexReplaceAll" => regex_replace_all,
    "regexReplaceAllLiteral" => regex_replace_all_literal,
    "regexSplit" => regex_split,
    "base" => path_base,
    "dir" => path_dir,
    "ext" => path_ext,

    // Defaults and flow
    "default" => default,
    "empty" => empty,
    "coalesce" => coalesce,
    "ternary" => ternary,
    "required" => required,
    "fail" => fail,

    // Comparison
    "eq" => eq,
    "ne" => ne,
    "lt" => lt,
    "le" => le,
    "gt" => gt,
    "ge" => ge,
    "not" => not,
    "deepEqual" => deep_equal,

    // Encoding
    "toYaml" => to_yaml,
    "mustToYaml" => must_to_yaml,
    "toJson" => to_json,
    "mustToJson" => to_json,
    "toRawJson" => to_json,
    "toPrettyJson" => to_pretty_json,
    "fromYaml" => from_yaml,
    "fromYamlArray" => from_yaml_array,
    "fromJson" => from_json,
    "fromJsonArray" => from_json_array,

    // Dicts
    "dict" => dict,
    "get" => get,
    "set" => set,
    "unset" => unset,
    "hasKey" => has_key,
    "keys" => keys,
    "values" => values,
    "pluck" => pluck,
    "pick" => pick,
    "omit" => omit,
    "merge" => merge,
    "mustMerge" => merge,
    "mergeOverwrite" => merge_overwrite,
    "mustMergeOverwrite" => merge_overwrite,
    "deepCopy" => deep_copy,
    "mustDeepCopy" => deep_copy,
    "dig" => dig,

    // Lists
    "list" => list,
    "tuple" => list,
    "append" => append,
    "mustAppend" => append,
    "push" => append,
    "prepend" => prepend,
    "concat" => concat,
    "first" => first,
    "mustFirst" => first,
    "last" => last,
    "mustLast" => last,
    "rest" => rest,
    "initial" => initial,
    "uniq" => uniq,
    "has" => has,
    "without" => without,
    "compact" => compact,
    "reverse" => reverse,
    "sortAlpha" => sort_alpha,
    "len" => len,
    "index" => index,
    "slice" => slice,
    "until" => until,
    "untilStep" => until_step,

    // Math
    "add" => add,
    "add1" => add1,
    "sub" => sub,
    "mul" => mul,
    "div" => div,
    "mod" => modulo,
    "max" => max,
    "min" => min,
    "addf" => addf,
    "subf" => subf,
    "mulf" => mulf,
    "divf" => divf,
    "floor" => floor,
    "ceil" => ceil,
    "round" => round,
    "int" => int,
    "int64" => int,
    "float64" => float64,
    "atoi" => int,

    // Types
    "kindIs" => kind_is,
    "kindOf" => kind_of_fn,
    "typeOf" => type_of_fn,
    "typeIs" => type_is,
    "typeIsLike" => type_is_like,

    // Versions
    "semverCompare" => semver_compare,

    // Cluster and randomness: rendering stays offline and reproducible
    "lookup" => lookup,
    "uuidv4" => uuidv4,
    "randAlphaNum" => rand_string,
    "randAlpha" => rand_string,
    "randNumeric" => rand_string,
    "randAscii" => rand_string,
    "genCA" => gen_cert,
    "genSelfSignedCert" => gen_cert,
    "genSignedCert" => gen_cert,
    "genPrivateKey" => blank,
    "htpasswd" => blank,
    "derivePassword" => blank,
    "encryptAES" => blank,
    "decryptAES" => blank,
    "getHostByName" => blank,
};

pub fn lookup_function(name: &str) -> Option<Builtin> {
    FUNCTIONS.get(name).copied()
}

fn arg(args: &[Value], i: usize) -> &Value {
    args.get(i).unwrap_or(&Value::Null)
}

fn str_arg(args: &[Value], i: usize) -> String {
    to_str(arg(args, i))
}

fn int_arg(args: &[Value], i: usize) -> i64 {
    to_i64(arg(args, i))
}

fn last_str(args: &[Value]) -> String {
    args.last().map(to_str).unwrap_or_default()
}

fn min_args(name: &str, args: &[Value], n: usize) -> Result<(), String> {
    if args.len() < n {
        return Err(format!(
            "wrong number of args for {}: want at least {} got {}",
            name,
            n,
            args.len()
        ));
    }
    Ok(())
}

fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn as_map<'a>(name: &str, value: &'a Value) -> Result<&'a Map<String, Value>, String> {
    value
        .as_object()
        .ok_or_else(|| format!("{}: expected a map, got {}", name, kind_of(value)))
}

fn string(s: impl Into<String>) -> FuncResult {
    Ok(Value::String(s.into()))
}

// Strings

/// Go `%q` quoting
pub fn go_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn quote(args: &[Value]) -> FuncResult {
    let quoted: Vec<String> = args
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| go_quote(&to_str(v)))
        .collect();
    string(quoted.join(" "))
}

fn squote(args: &[Value]) -> FuncResult {
    let quoted: Vec<String> = args
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| format!("'{}'", to_str(v)))
        .collect();
    string(quoted.join(" "))
}

fn upper(args: &[Value]) -> FuncResult {
    string(last_str(args).to_uppercase())
}

fn lower(args: &[Value]) -> FuncResult {
    string(last_str(args).to_lowercase())
}

fn map_words(s: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word = String::new();
    for c in s.chars() {
        if c.is_whitespace() {
            out.push_str(&f(&word));
            word.clear();
            out.push(c);
        } else {
            word.push(c);
        }
    }
    out.push_str(&f(&word));
    out
}

fn title(args: &[Value]) -> FuncResult {
    string(map_words(&last_str(args), |w| {
        let mut chars = w.chars();
        match chars.next() {
            Some(c) => c.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }))
}

fn untitle(args: &[Value]) -> FuncResult {
    string(map_words(&last_str(args), |w| {
        let mut chars = w.chars();
        match chars.next() {
            Some(c) => c.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }))
}

fn trim(args: &[Value]) -> FuncResult {
    string(last_str(args).trim())
}

fn trim_all(args: &[Value]) -> FuncResult {
    let cutset: Vec<char> = str_arg(args, 0).chars().collect();
    string(str_arg(args, 1).trim_matches(cutset.as_slice()))
}

fn trim_prefix(args: &[Value]) -> FuncResult {
    let (prefix, s) = (str_arg(args, 0), str_arg(args, 1));
    string(s.strip_prefix(prefix.as_str()).unwrap_or(&s))
}

fn trim_suffix(args: &[Value]) -> FuncResult {
    let (suffix, s) = (str_arg(args, 0), str_arg(args, 1));
    string(s.strip_suffix(suffix.as_str()).unwrap_or(&s))
}

/// `trunc 5 s` keeps the first five characters, `trunc -5 s` the last five
fn trunc(args: &[Value]) -> FuncResult {
    let n = int_arg(args, 0);
    let chars: Vec<char> = str_arg(args, 1).chars().collect();
    let len = chars.len() as i64;
    let kept: String = if n < 0 && len + n > 0 {
        chars[(len + n) as usize..].iter().collect()
    } else if n >= 0 && len > n {
        chars[..n as usize].iter().collect()
    } else {
        chars.iter().collect()
    };
    string(kept)
}

fn abbrev(args: &[Value]) -> FuncResult {
    let width = int_arg(args, 0).max(0) as usize;
    let s = str_arg(args, 1);
    if width < 4 || s.chars().count() <= width {
        return string(s);
    }
    let kept: String = s.chars().take(width - 3).collect();
    string(format!("{}...", kept))
}

fn replace(args: &[Value]) -> FuncResult {
    string(str_arg(args, 2).replace(&str_arg(args, 0), &str_arg(args, 1)))
}

fn contains(args: &[Value]) -> FuncResult {
    Ok(Value::Bool(str_arg(args, 1).contains(&str_arg(args, 0))))
}

fn has_prefix(args: &[Value]) -> FuncResult {
    Ok(Value::Bool(str_arg(args, 1).starts_with(&str_arg(args, 0))))
}

fn has_suffix(args: &[Value]) -> FuncResult {
    Ok(Value::Bool(str_arg(args, 1).ends_with(&str_arg(args, 0))))
}

fn repeat(args: &[Value]) -> FuncResult {
    string(str_arg(args, 1).repeat(int_arg(args, 0).max(0) as usize))
}

fn substr(args: &[Value]) -> FuncResult {
    let (start, end) = (int_arg(args, 0), int_arg(args, 1));
    let chars: Vec<char> = str_arg(args, 2).chars().collect();
    let len = chars.len() as i64;
    let out: String = if start < 0 {
        chars[..end.clamp(0, len) as usize].iter().collect()
    } else if end < 0 || end > len {
        chars[start.min(len) as usize..].iter().collect()
    } else {
        chars[start.min(end) as usize..end as usize].iter().collect()
    };
    string(out)
}

fn nospace(args: &[Value]) -> FuncResult {
    string(last_str(args).split_whitespace().collect::<String>())
}

fn cat(args: &[Value]) -> FuncResult {
    let parts: Vec<String> = args.iter().filter(|v| !v.is_null()).map(to_str).collect();
    string(parts.join(" "))
}

/// Pad every line, empty ones included
pub fn indent_lines(s: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    format!("{}{}", pad, s.replace('\n', &format!("\n{}", pad)))
}

fn indent(args: &[Value]) -> FuncResult {
    string(indent_lines(&str_arg(args, 1), int_arg(args, 0).max(0) as usize))
}

fn nindent(args: &[Value]) -> FuncResult {
    string(format!(
        "\n{}",
        indent_lines(&str_arg(args, 1), int_arg(args, 0).max(0) as usize)
    ))
}

fn printf(args: &[Value]) -> FuncResult {
    min_args("printf", args, 1)?;
    string(sprintf(&str_arg(args, 0), &args[1..]))
}

/// `fmt.Sprint`: a space separates operands when neither is a string
fn print_fn(args: &[Value]) -> FuncResult {
    let mut out = String::new();
    for (i, value) in args.iter().enumerate() {
        if i > 0 && !args[i - 1].is_string() && !value.is_string() {
            out.push(' ');
        }
        out.push_str(&print_operand(value));
    }
    string(out)
}

fn println_fn(args: &[Value]) -> FuncResult {
    let parts: Vec<String> = args.iter().map(print_operand).collect();
    string(format!("{}\n", parts.join(" ")))
}

fn print_operand(value: &Value) -> String {
    if value.is_null() {
        "<nil>".to_string()
    } else {
        print(value)
    }
}

fn to_string(args: &[Value]) -> FuncResult {
    string(last_str(args))
}

fn to_strings(args: &[Value]) -> FuncResult {
    Ok(Value::Array(
        as_list(arg(args, 0))
            .iter()
            .map(|v| Value::String(to_str(v)))
            .collect(),
    ))
}

/// `split "$" "a$b"` gives `{_0: a, _1: b}`
fn split(args: &[Value]) -> FuncResult {
    let (sep, s) = (str_arg(args, 0), str_arg(args, 1));
    let map: Map<String, Value> = s
        .split(sep.as_str())
        .enumerate()
        .map(|(i, part)| (format!("_{}", i), Value::String(part.to_string())))
        .collect();
    Ok(Value::Object(map))
}

fn split_list(args: &[Value]) -> FuncResult {
    let (sep, s) = (str_arg(args, 0), str_arg(args, 1));
    Ok(Value::Array(
        s.split(sep.as_str())
            .map(|part| Value::String(part.to_string()))
            .collect(),
    ))
}

fn join(args: &[Value]) -> FuncResult {
    let sep = str_arg(args, 0);
    let parts: Vec<String> = as_list(arg(args, 1)).iter().map(to_str).collect();
    string(parts.join(&sep))
}

fn words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in s.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn camelcase(args: &[Value]) -> FuncResult {
    let out: String = words(&last_str(args))
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    string(out)
}

fn snakecase(args: &[Value]) -> FuncResult {
    let parts: Vec<String> = words(&last_str(args))
        .iter()
        .map(|w| w.to_lowercase())
        .collect();
    string(parts.join("_"))
}

fn kebabcase(args: &[Value]) -> FuncResult {
    let parts: Vec<String> = words(&last_str(args))
        .iter()
        .map(|w| w.to_lowercase())
        .collect();
    string(parts.join("-"))
}

fn b64enc(args: &[Value]) -> FuncResult {
    string(base64::engine::general_purpose::STANDARD.encode(last_str(args).as_bytes()))
}

fn b64dec(args: &[Value]) -> FuncResult {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(last_str(args).as_bytes())
        .map_err(|e| e.to_string())?;
    string(String::from_utf8_lossy(&decoded).into_owned())
}

fn sha256sum(args: &[Value]) -> FuncResult {
    string(format!("{:x}", Sha256::digest(last_str(args).as_bytes())))
}

fn compile_regex(pattern: &str) -> Result<Regex, String> {
    Regex::new(pattern).map_err(|e| e.to_string())
}

fn regex_match(args: &[Value]) -> FuncResult {
    Ok(Value::Bool(compile_regex(&str_arg(args, 0))?.is_match(&str_arg(args, 1))))
}

fn regex_find(args: &[Value]) -> FuncResult {
    let s = str_arg(args, 1);
    let found = compile_regex(&str_arg(args, 0))?
        .find(&s)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    string(found)
}

fn regex_find_all(args: &[Value]) -> FuncResult {
    let s = str_arg(args, 1);
    let limit = int_arg(args, 2);
    let re = compile_regex(&str_arg(args, 0))?;
    let found = re
        .find_iter(&s)
        .take(if limit < 0 { usize::MAX } else { limit as usize })
        .map(|m| Value::String(m.as_str().to_string()))
        .collect();
    Ok(Value::Array(found))
}

fn regex_replace_all(args: &[Value]) -> FuncResult {
    let (s, repl) = (str_arg(args, 1), str_arg(args, 2));
    string(compile_regex(&str_arg(args, 0))?.replace_all(&s, repl.as_str()))
}

fn regex_replace_all_literal(args: &[Value]) -> FuncResult {
    let (s, repl) = (str_arg(args, 1), str_arg(args, 2));
    string(compile_regex(&str_arg(args, 0))?.replace_all(&s, regex::NoExpand(&repl)))
}

fn regex_split(args: &[Value]) -> FuncResult {
    let s = str_arg(args, 1);
    let limit = int_arg(args, 2);
    let re = compile_regex(&str_arg(args, 0))?;
    let parts: Vec<Value> = if limit < 0 {
        re.split(&s).map(|p| Value::String(p.to_string())).collect()
    } else {
        re.splitn(&s, limit as usize)
            .map(|p| Value::String(p.to_string()))
            .collect()
    };
    Ok(Value::Array(parts))
}

fn path_base(args: &[Value]) -> FuncResult {
    let path = last_str(args);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return string(if path.is_empty() { "." } else { "/" });
    }
    string(trimmed.rsplit('/').next().unwrap_or(trimmed))
}

fn path_dir(args: &[Value]) -> FuncResult {
    let path = last_str(args);
    match path.rsplit_once('/') {
        Some(("", _)) => string("/"),
        Some((dir, _)) => string(dir),
        None => string("."),
    }
}

fn path_ext(args: &[Value]) -> FuncResult {
    let path = last_str(args);
    let base = path.rsplit('/').next().unwrap_or(&path);
    string(base.rfind('.').map(|i| &base[i..]).unwrap_or(""))
}

// Defaults and flow

fn default(args: &[Value]) -> FuncResult {
    match args.get(1) {
        Some(given) if truth(given) => Ok(given.clone()),
        _ => Ok(arg(args, 0).clone()),
    }
}

fn empty(args: &[Value]) -> FuncResult {
    Ok(Value::Bool(!truth(arg(args, 0))))
}

fn coalesce(args: &[Value]) -> FuncResult {
    Ok(args.iter().find(|v| truth(v)).cloned().unwrap_or(Value::Null))
}

fn ternary(args: &[Value]) -> FuncResult {
    min_args("ternary", args, 3)?;
    Ok(if truth(&args[2]) {
        args[0].clone()
    } else {
        args[1].clone()
    })
}

fn required(args: &[Value]) -> FuncResult {
    let value = arg(args, 1);
    match value {
        Value::Null => Err(str_arg(args, 0)),
        Value::String(s) if s.is_empty() => Err(str_arg(args, 0)),
        _ => Ok(value.clone()),
    }
}

fn fail(args: &[Value]) -> FuncResult {
    Err(str_arg(args, 0))
}

// Comparison

fn eq(args: &[Value]) -> FuncResult {
    min_args("eq", args, 2)?;
    Ok(Value::Bool(args[1..].iter().any(|b| equal(&args[0], b))))
}

fn ne(args: &[Value]) -> FuncResult {
    min_args("ne", args, 2)?;
    Ok(Value::Bool(!equal(&args[0], &args[1])))
}

fn ordered(name: &str, args: &[Value], accept: fn(std::cmp::Ordering) -> bool) -> FuncResult {
    min_args(name, args, 2)?;
    compare(&args[0], &args[1]).map(|o| Value::Bool(accept(o)))
}

fn lt(args: &[Value]) -> FuncResult {
    ordered("lt", args, |o| o.is_lt())
}

fn le(args: &[Value]) -> FuncResult {
    ordered("le", args, |o| o.is_le())
}

fn gt(args: &[Value]) -> FuncResult {
    ordered("gt", args, |o| o.is_gt())
}

fn ge(args: &[Value]) -> FuncResult {
    ordered("ge", args, |o| o.is_ge())
}

fn not(args: &[Value]) -> FuncResult {
    Ok(Value::Bool(!truth(arg(args, 0))))
}

fn deep_equal(args: &[Value]) -> FuncResult {
    Ok(Value::Bool(arg(args, 0) == arg(args, 1)))
}

// Encoding

pub fn yaml_string(value: &Value) -> Result<String, String> {
    let yaml = serde_yaml::to_string(value).map_err(|e| e.to_string())?;
    Ok(yaml.strip_suffix('\n').unwrap_or(&yaml).to_string())
}

fn to_yaml(args: &[Value]) -> FuncResult {
    string(yaml_string(arg(args, 0)).unwrap_or_default())
}

fn must_to_yaml(args: &[Value]) -> FuncResult {
    string(yaml_string(arg(args, 0))?)
}

fn to_json(args: &[Value]) -> FuncResult {
    string(serde_json::to_string(arg(args, 0)).map_err(|e| e.to_string())?)
}

fn to_pretty_json(args: &[Value]) -> FuncResult {
    string(serde_json::to_string_pretty(arg(args, 0)).map_err(|e| e.to_string())?)
}

/// Helm reports decoding failures inside the result instead of failing
fn from_yaml(args: &[Value]) -> FuncResult {
    Ok(
        match serde_yaml::from_str::<Option<Value>>(&str_arg(args, 0)) {
            Ok(Some(Value::Object(map))) => Value::Object(map),
            Ok(_) => Value::Object(Map::new()),
            Err(e) => json!({ "Error": e.to_string() }),
        },
    )
}

fn from_yaml_array(args: &[Value]) -> FuncResult {
    Ok(
        match serde_yaml::from_str::<Option<Value>>(&str_arg(args, 0)) {
            Ok(Some(Value::Array(items))) => Value::Array(items),
            Ok(_) => Value::Array(Vec::new()),
            Err(e) => json!([e.to_string()]),
        },
    )
}

fn from_json(args: &[Value]) -> FuncResult {
    Ok(match serde_json::from_str::<Value>(&str_arg(args, 0)) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(_) => Value::Object(Map::new()),
        Err(e) => json!({ "Error": e.to_string() }),
    })
}

fn from_json_array(args: &[Value]) -> FuncResult {
    Ok(match serde_json::from_str::<Value>(&str_arg(args, 0)) {
        Ok(Value::Array(items)) => Value::Array(items),
        Ok(_) => Value::Array(Vec::new()),
        Err(e) => json!([e.to_string()]),
    })
}

// Dicts

fn dict(args: &[Value]) -> FuncResult {
    let mut map = Map::new();
    for pair in args.chunks(2) {
        let value = pair.get(1).cloned().unwrap_or_else(|| Value::String(String::new()));
        map.insert(to_str(&pair[0]), value);
    }
    Ok(Value::Object(map))
}

fn get(args: &[Value]) -> FuncResult {
    let map = as_map("get", arg(args, 0))?;
    Ok(map
        .get(&str_arg(args, 1))
        .cloned()
        .unwrap_or_else(|| Value::String(String::new())))
}

fn set(args: &[Value]) -> FuncResult {
    let mut map = as_map("set", arg(args, 0))?.clone();
    map.insert(str_arg(args, 1), arg(args, 2).clone());
    Ok(Value::Object(map))
}

fn unset(args: &[Value]) -> FuncResult {
    let mut map = as_map("unset", arg(args, 0))?.clone();
    map.remove(&str_arg(args, 1));
    Ok(Value::Object(map))
}

fn has_key(args: &[Value]) -> FuncResult {
    let map = as_map("hasKey", arg(args, 0))?;
    Ok(Value::Bool(map.contains_key(&str_arg(args, 1))))
}

fn keys(args: &[Value]) -> FuncResult {
    let mut all = Vec::new();
    for value in args {
        all.extend(as_map("keys", value)?.keys().cloned());
    }
    all.sort();
    Ok(Value::Array(all.into_iter().map(Value::String).collect()))
}

fn values(args: &[Value]) -> FuncResult {
    let map = as_map("values", arg(args, 0))?;
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    Ok(Value::Array(entries.into_iter().map(|(_, v)| v.clone()).collect()))
}

fn pluck(args: &[Value]) -> FuncResult {
    let key = str_arg(args, 0);
    let found = args
        .iter()
        .skip(1)
        .filter_map(|d| d.as_object().and_then(|m| m.get(&key)).cloned())
        .collect();
    Ok(Value::Array(found))
}

fn pick(args: &[Value]) -> FuncResult {
    let map = as_map("pick", arg(args, 0))?;
    let wanted: Vec<String> = args.iter().skip(1).map(to_str).collect();
    Ok(Value::Object(
        map.iter()
            .filter(|(k, _)| wanted.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    ))
}

fn omit(args: &[Value]) -> FuncResult {
    let map = as_map("omit", arg(args, 0))?;
    let dropped: Vec<String> = args.iter().skip(1).map(to_str).collect();
    Ok(Value::Object(
        map.iter()
            .filter(|(k, _)| !dropped.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    ))
}

/// Keys already in the destination win
fn merge(args: &[Value]) -> FuncResult {
    let mut dst = as_map("merge", arg(args, 0))?.clone();
    for src in args.iter().skip(1) {
        if let Value::Object(src) = src {
            merge_missing(&mut dst, src);
        }
    }
    Ok(Value::Object(dst))
}

/// Later sources win
fn merge_overwrite(args: &[Value]) -> FuncResult {
    let mut dst = Value::Object(as_map("mergeOverwrite", arg(args, 0))?.clone());
    for src in args.iter().skip(1) {
        if src.is_object() {
            deep_merge(&mut dst, src);
        }
    }
    Ok(dst)
}

fn deep_copy(args: &[Value]) -> FuncResult {
    Ok(arg(args, 0).clone())
}

/// `dig "a" "b" "default" $dict`
fn dig(args: &[Value]) -> FuncResult {
    min_args("dig", args, 3)?;
    let (path, rest) = args.split_at(args.len() - 2);
    let fallback = &rest[0];
    let mut current = &rest[1];
    for key in path {
        match current.as_object().and_then(|m| m.get(&to_str(key))) {
            Some(next) => current = next,
            None => return Ok(fallback.clone()),
        }
    }
    Ok(current.clone())
}

// Lists

fn list(args: &[Value]) -> FuncResult {
    Ok(Value::Array(args.to_vec()))
}

fn append(args: &[Value]) -> FuncResult {
    let mut items = as_list(arg(args, 0));
    items.push(arg(args, 1).clone());
    Ok(Value::Array(items))
}

fn prepend(args: &[Value]) -> FuncResult {
    let mut items = as_list(arg(args, 0));
    items.insert(0, arg(args, 1).clone());
    Ok(Value::Array(items))
}

fn concat(args: &[Value]) -> FuncResult {
    Ok(Value::Array(args.iter().flat_map(as_list).collect()))
}

fn first(args: &[Value]) -> FuncResult {
    Ok(as_list(arg(args, 0)).into_iter().next().unwrap_or(Value::Null))
}

fn last(args: &[Value]) -> FuncResult {
    Ok(as_list(arg(args, 0)).pop().unwrap_or(Value::Null))
}

fn rest(args: &[Value]) -> FuncResult {
    Ok(Value::Array(as_list(arg(args, 0)).into_iter().skip(1).collect()))
}

fn initial(args: &[Value]) -> FuncResult {
    let mut items = as_list(arg(args, 0));
    items.pop();
    Ok(Value::Array(items))
}

fn uniq(args: &[Value]) -> FuncResult {
    let mut out: Vec<Value> = Vec::new();
    for item in as_list(arg(args, 0)) {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    Ok(Value::Array(out))
}

fn has(args: &[Value]) -> FuncResult {
    let needle = arg(args, 0);
    Ok(Value::Bool(
        as_list(arg(args, 1)).iter().any(|v| equal(v, needle)),
    ))
}

fn without(args: &[Value]) -> FuncResult {
    let dropped = &args[1.min(args.len())..];
    Ok(Value::Array(
        as_list(arg(args, 0))
            .into_iter()
            .filter(|v| !dropped.contains(v))
            .collect(),
    ))
}

fn compact(args: &[Value]) -> FuncResult {
    Ok(Value::Array(
        as_list(arg(args, 0)).into_iter().filter(truth).collect(),
    ))
}

fn reverse(args: &[Value]) -> FuncResult {
    let mut items = as_list(arg(args, 0));
    items.reverse();
    Ok(Value::Array(items))
}

fn sort_alpha(args: &[Value]) -> FuncResult {
    let mut items: Vec<String> = as_list(arg(args, 0)).iter().map(to_str).collect();
    items.sort();
    Ok(Value::Array(items.into_iter().map(Value::String).collect()))
}

fn len(args: &[Value]) -> FuncResult {
    let n = match arg(args, 0) {
        Value::String(s) => s.len(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        Value::Null => 0,
        other => return Err(format!("len of type {}", type_of(other))),
    };
    Ok(Value::from(n))
}

fn index(args: &[Value]) -> FuncResult {
    let mut current = arg(args, 0).clone();
    for key in args.iter().skip(1) {
        current = match current {
            Value::Array(items) => {
                let i = to_i64(key);
                if i < 0 || i as usize >= items.len() {
                    return Err(format!("index out of range: {}", i));
                }
                items[i as usize].clone()
            }
            Value::Object(map) => map.get(&to_str(key)).cloned().unwrap_or(Value::Null),
            Value::Null => Value::Null,
            other => return Err(format!("can't index item of type {}", type_of(&other))),
        };
    }
    Ok(current)
}

fn slice(args: &[Value]) -> FuncResult {
    let items = as_list(arg(args, 0));
    let len = items.len() as i64;
    let start = args.get(1).map(to_i64).unwrap_or(0).clamp(0, len) as usize;
    let end = args.get(2).map(to_i64).unwrap_or(len).clamp(0, len) as usize;
    Ok(Value::Array(items[start.min(end)..end].to_vec()))
}

fn until(args: &[Value]) -> FuncResult {
    let n = int_arg(args, 0);
    let step = if n < 0 { -1 } else { 1 };
    until_step(&[json!(0), json!(n), json!(step)])
}

fn until_step(args: &[Value]) -> FuncResult {
    let (start, stop, step) = (int_arg(args, 0), int_arg(args, 1), int_arg(args, 2));
    let mut out = Vec::new();
    if step == 0 {
        return Ok(Value::Array(out));
    }
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(Value::from(i));
        i += step;
    }
    Ok(Value::Array(out))
}

// Math: sprig's integer functions work on int64

fn add(args: &[Value]) -> FuncResult {
    Ok(Value::from(args.iter().map(to_i64).sum::<i64>()))
}

fn add1(args: &[Value]) -> FuncResult {
    Ok(Value::from(int_arg(args, 0) + 1))
}

fn sub(args: &[Value]) -> FuncResult {
    Ok(Value::from(int_arg(args, 0) - int_arg(args, 1)))
}

fn mul(args: &[Value]) -> FuncResult {
    Ok(Value::from(args.iter().map(to_i64).product::<i64>()))
}

fn div(args: &[Value]) -> FuncResult {
    let divisor = int_arg(args, 1);
    if divisor == 0 {
        return Err("integer divide by zero".to_string());
    }
    Ok(Value::from(int_arg(args, 0) / divisor))
}

fn modulo(args: &[Value]) -> FuncResult {
    let divisor = int_arg(args, 1);
    if divisor == 0 {
        return Err("integer divide by zero".to_string());
    }
    Ok(Value::from(int_arg(args, 0) % divisor))
}

fn max(args: &[Value]) -> FuncResult {
    Ok(Value::from(args.iter().map(to_i64).max().unwrap_or_default()))
}

fn min(args: &[Value]) -> FuncResult {
    Ok(Value::from(args.iter().map(to_i64).min().unwrap_or_default()))
}

fn addf(args: &[Value]) -> FuncResult {
    Ok(from_f64(args.iter().map(to_f64).sum()))
}

fn subf(args: &[Value]) -> FuncResult {
    let mut iter = args.iter().map(to_f64);
    let first = iter.next().unwrap_or_default();
    Ok(from_f64(iter.fold(first, |acc, v| acc - v)))
}

fn mulf(args: &[Value]) -> FuncResult {
    Ok(from_f64(args.iter().map(to_f64).product()))
}

fn divf(args: &[Value]) -> FuncResult {
    let mut iter = args.iter().map(to_f64);
    let first = iter.next().unwrap_or_default();
    Ok(from_f64(iter.fold(first, |acc, v| acc / v)))
}

fn floor(args: &[Value]) -> FuncResult {
    Ok(from_f64(to_f64(arg(args, 0)).floor()))
}

fn ceil(args: &[Value]) -> FuncResult {
    Ok(from_f64(to_f64(arg(args, 0)).ceil()))
}

fn round(args: &[Value]) -> FuncResult {
    let factor = 10f64.powi(int_arg(args, 1) as i32);
    Ok(from_f64((to_f64(arg(args, 0)) * factor).round() / factor))
}

fn int(args: &[Value]) -> FuncResult {
    Ok(Value::from(int_arg(args, 0)))
}

fn float64(args: &[Value]) -> FuncResult {
    Ok(from_f64(to_f64(arg(args, 0))))
}

// Types

fn kind_is(args: &[Value]) -> FuncResult {
    let kind = str_arg(args, 0);
    let actual = kind_of(arg(args, 1));
    let matches = kind == actual || (kind == "int" && actual == "int64");
    Ok(Value::Bool(matches))
}

fn kind_of_fn(args: &[Value]) -> FuncResult {
    string(kind_of(arg(args, 0)))
}

fn type_of_fn(args: &[Value]) -> FuncResult {
    string(type_of(arg(args, 0)))
}

fn type_is(args: &[Value]) -> FuncResult {
    Ok(Value::Bool(str_arg(args, 0) == type_of(arg(args, 1))))
}

fn type_is_like(args: &[Value]) -> FuncResult {
    let wanted = str_arg(args, 0);
    let actual = type_of(arg(args, 1));
    Ok(Value::Bool(
        wanted == actual || wanted.strip_prefix('*') == Some(actual),
    ))
}

// Versions

/// `semverCompare ">=1.21-0" "v1.31.0"`
///
/// Spaces and commas join terms, `||` separates alternatives. The `-0`
/// prerelease marker is dropped and so is any prerelease of the version.
fn semver_compare(args: &[Value]) -> FuncResult {
    let constraint = str_arg(args, 0);
    let raw = str_arg(args, 1);
    let version = parse_loose_version(&raw).ok_or_else(|| format!("invalid semantic version: {}", raw))?;

    for alternative in constraint.split("||") {
        let mut satisfied = true;
        for term in constraint_terms(alternative) {
            if term == "*" || term == "x" {
                continue;
            }
            let comparator = semver::Comparator::parse(&term)
                .map_err(|e| format!("invalid constraint '{}': {}", constraint, e))?;
            if !comparator.matches(&version) {
                satisfied = false;
                break;
            }
        }
        if satisfied {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn parse_loose_version(raw: &str) -> Option<semver::Version> {
    let clean = raw.trim().trim_start_matches('v');
    let core = clean.split(['-', '+']).next().unwrap_or(clean);
    let mut parts = core.split('.').map(|p| p.parse::<u64>().ok());
    let major = parts.next().flatten()?;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some(semver::Version::new(major, minor, patch))
}

/// Split one alternative into comparator strings, joining `>= 1.2` pairs
fn constraint_terms(alternative: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;
    for token in alternative.split([',', ' ']).filter(|t| !t.is_empty()) {
        if token.chars().all(|c| "<>=!~^".contains(c)) {
            pending_op = Some(token.to_string());
            continue;
        }
        let term = format!("{}{}", pending_op.take().unwrap_or_default(), token);
        let term = term.trim_start_matches('v');
        terms.push(strip_prerelease_marker(term).replacen("=v", "=", 1));
    }
    terms
}

fn strip_prerelease_marker(term: &str) -> String {
    match term.rsplit_once('-') {
        Some((base, _)) => base.to_string(),
        None => term.to_string(),
    }
}

// Offline stand-ins

fn lookup(_args: &[Value]) -> FuncResult {
    Ok(Value::Object(Map::new()))
}

fn uuidv4(_args: &[Value]) -> FuncResult {
    string("00000000-0000-4000-8000-000000000000")
}

fn rand_string(args: &[Value]) -> FuncResult {
    string("x".repeat(int_arg(args, 0).max(0) as usize))
}

fn gen_cert(_args: &[Value]) -> FuncResult {
    Ok(json!({ "Cert": "", "Key": "" }))
}

fn blank(_args: &[Value]) -> FuncResult {
    string("")
}

/// Go `fmt.Sprintf` for the verbs charts use
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len() + args.len() * 8);
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut left_align = false;
        let mut zero_pad = false;
        let mut plus = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                '+' => plus = true,
                ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            width.push(d);
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            precision = Some(digits.parse::<usize>().unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        let Some(value) = args.get(next_arg) else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        next_arg += 1;

        let formatted = format_verb(verb, value, precision, plus);
        let width: usize = width.parse().unwrap_or(0);
        let pad = width.saturating_sub(formatted.chars().count());
        if pad == 0 {
            out.push_str(&formatted);
        } else if left_align {
            out.push_str(&formatted);
            out.push_str(&" ".repeat(pad));
        } else if zero_pad && value.is_number() {
            let (sign, digits) = match formatted.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", formatted.as_str()),
            };
            out.push_str(sign);
            out.push_str(&"0".repeat(pad));
            out.push_str(digits);
        } else {
            out.push_str(&" ".repeat(pad));
            out.push_str(&formatted);
        }
    }

    if next_arg < args.len() {
        let extra: Vec<String> = args[next_arg..]
            .iter()
            .map(|v| format!("{}={}", type_of(v), print_operand(v)))
            .collect();
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

fn format_verb(verb: char, value: &Value, precision: Option<usize>, plus: bool) -> String {
    match verb {
        'd' => match value {
            Value::Number(_) => {
                let n = to_i64(value);
                if plus && n >= 0 {
                    format!("+{}", n)
                } else {
                    n.to_string()
                }
            }
            other => format!("%!d({}={})", type_of(other), print_operand(other)),
        },
        'f' | 'F' => match value {
            Value::Number(_) => format!("{:.*}", precision.unwrap_or(6), to_f64(value)),
            other => format!("%!f({}={})", type_of(other), print_operand(other)),
        },
        'g' => format_float(to_f64(value)),
        'e' => format!("{:e}", to_f64(value)),
        'q' => go_quote(&to_str(value)),
        't' => match value {
            Value::Bool(b) => b.to_string(),
            other => format!("%!t({}={})", type_of(other), print_operand(other)),
        },
        'x' => match value {
            Value::Number(_) => format!("{:x}", to_i64(value)),
            other => to_str(other).bytes().map(|b| format!("{:02x}", b)).collect(),
        },
        'X' => match value {
            Value::Number(_) => format!("{:X}", to_i64(value)),
            other => to_str(other).bytes().map(|b| format!("{:02X}", b)).collect(),
        },
        'o' => format!("{:o}", to_i64(value)),
        'c' => char::from_u32(to_i64(value) as u32)
            .map(String::from)
            .unwrap_or_default(),
        _ => {
            let s = print_operand(value);
            match precision {
                Some(p) if verb == 's' => s.chars().take(p).collect(),
                _ => s,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> FuncResult {
        lookup_function(name).expect("known function")(args)
    }

    #[test]
    fn test_default_and_coalesce() {
        assert_eq!(call("default", &[json!("latest"), json!("")]), Ok(json!("latest")));
        assert_eq!(call("default", &[json!("latest"), json!("1.25")]), Ok(json!("1.25")));
        assert_eq!(call("default", &[json!("latest")]), Ok(json!("latest")));
        assert_eq!(
            call("coalesce", &[json!(null), json!(""), json!("b")]),
            Ok(json!("b"))
        );
    }

    #[test]
    fn test_quote_and_indent() {
        assert_eq!(call("quote", &[json!("a\"b")]), Ok(json!("\"a\\\"b\"")));
        assert_eq!(call("quote", &[json!(3)]), Ok(json!("\"3\"")));
        assert_eq!(call("nindent", &[json!(2), json!("a\nb")]), Ok(json!("\n  a\n  b")));
        assert_eq!(call("indent", &[json!(2), json!("a")]), Ok(json!("  a")));
    }

    #[test]
    fn test_trunc_and_trim() {
        assert_eq!(call("trunc", &[json!(3), json!("abcdef")]), Ok(json!("abc")));
        assert_eq!(call("trunc", &[json!(-2), json!("abcdef")]), Ok(json!("ef")));
        assert_eq!(call("trimSuffix", &[json!("-"), json!("web-")]), Ok(json!("web")));
        assert_eq!(call("trimPrefix", &[json!("v"), json!("v1.2")]), Ok(json!("1.2")));
    }

    #[test]
    fn test_printf() {
        assert_eq!(
            sprintf("%s/%s:%s", &[json!("docker.io"), json!("nginx"), json!("1.25")]),
            "docker.io/nginx:1.25"
        );
        assert_eq!(sprintf("%d-%v", &[json!(3), json!(true)]), "3-true");
        assert_eq!(sprintf("%q", &[json!("x")]), "\"x\"");
        assert_eq!(sprintf("%.2f", &[json!(1.5)]), "1.50");
        assert_eq!(sprintf("%03d", &[json!(7)]), "007");
        assert_eq!(sprintf("%s", &[]), "%!s(MISSING)");
    }

    #[test]
    fn test_dict_helpers() {
        let d = call("dict", &[json!("a"), json!(1), json!("b")]).unwrap();
        assert_eq!(d, json!({"a": 1, "b": ""}));
        assert_eq!(call("hasKey", &[d.clone(), json!("a")]), Ok(json!(true)));
        assert_eq!(call("get", &[d.clone(), json!("z")]), Ok(json!("")));
        assert_eq!(call("set", &[d.clone(), json!("c"), json!(3)]).unwrap()["c"], json!(3));
        assert_eq!(
            call("merge", &[json!({"a": 1}), json!({"a": 2, "b": 2})]),
            Ok(json!({"a": 1, "b": 2}))
        );
        assert_eq!(
            call("mergeOverwrite", &[json!({"a": 1}), json!({"a": 2})]),
            Ok(json!({"a": 2}))
        );
        assert_eq!(
            call("dig", &[json!("a"), json!("b"), json!("none"), json!({"a": {"b": "x"}})]),
            Ok(json!("x"))
        );
    }

    #[test]
    fn test_list_helpers() {
        assert_eq!(call("until", &[json!(3)]), Ok(json!([0, 1, 2])));
        assert_eq!(call("has", &[json!(2), json!([1, 2])]), Ok(json!(true)));
        assert_eq!(call("uniq", &[json!([1, 1, 2])]), Ok(json!([1, 2])));
        assert_eq!(call("index", &[json!({"a": ["x", "y"]}), json!("a"), json!(1)]), Ok(json!("y")));
        assert!(call("index", &[json!([1]), json!(5)]).is_err());
        assert_eq!(call("join", &[json!(","), json!(["a", 1])]), Ok(json!("a,1")));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call("eq", &[json!("a"), json!("b"), json!("a")]), Ok(json!(true)));
        assert_eq!(call("lt", &[json!(1), json!(2)]), Ok(json!(true)));
        assert_eq!(call("ge", &[json!(1.5), json!(2)]), Ok(json!(false)));
    }

    #[test]
    fn test_required_and_fail() {
        assert_eq!(call("required", &[json!("need it"), json!(null)]), Err("need it".to_string()));
        assert_eq!(call("required", &[json!("need it"), json!(0)]), Ok(json!(0)));
        assert_eq!(call("fail", &[json!("boom")]), Err("boom".to_string()));
    }

    #[test]
    fn test_semver_compare() {
        assert_eq!(call("semverCompare", &[json!(">=1.21-0"), json!("v1.31.0")]), Ok(json!(true)));
        assert_eq!(call("semverCompare", &[json!("<1.19-0"), json!("v1.31.0")]), Ok(json!(false)));
        assert_eq!(
            call("semverCompare", &[json!(">= 1.14-0, < 1.19-0 || ^1.30"), json!("1.31.2")]),
            Ok(json!(true))
        );
    }

    #[test]
    fn test_yaml_round_trip_helpers() {
        assert_eq!(call("toYaml", &[json!({"a": 1})]), Ok(json!("a: 1")));
        assert_eq!(call("fromYaml", &[json!("a: 1\n")]), Ok(json!({"a": 1})));
        assert!(call("fromYaml", &[json!("a: [")]).unwrap().get("Error").is_some());
    }

    #[test]
    fn test_case_helpers() {
        assert_eq!(call("camelcase", &[json!("http_server")]), Ok(json!("HttpServer")));
        assert_eq!(call("snakecase", &[json!("HttpServer")]), Ok(json!("http_server")));
        assert_eq!(call("kebabcase", &[json!("fooBar")]), Ok(json!("foo-bar")));
        assert_eq!(call("title", &[json!("hello world")]), Ok(json!("Hello World")));
    }
}
