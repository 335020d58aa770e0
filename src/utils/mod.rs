use rand::{Rng, distributions::Alphanumeric};
use serde_json::Value;

/// 按点号路径读取嵌套值，完整键优先
pub fn arr_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(found) = lookup(value, key) {
        return Some(found);
    }

    let mut current = value;
    for segment in key.split('.') {
        current = lookup(current, segment)?;
    }
    Some(current)
}

fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// 判断是否为关联数组：键不是 0..n 连续下标时为 true
pub fn arr_is_assoc(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map
            .keys()
            .enumerate()
            .all(|(i, k)| k.parse::<usize>() == Ok(i)),
        _ => false,
    }
}

/// 去掉空值并重新从 0 编号
pub fn arr_remove_empty(values: Vec<Value>) -> Vec<Value> {
    values.into_iter().filter(|v| !is_empty(v)).collect()
}

/// 空值：null、false、0、空字符串、"0"、空数组、空对象
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// 生成字母数字随机串
pub fn str_random(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// "ArticleController" -> "article_controller"
pub fn str_snake_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut prev_lower = false;
    for c in input.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else if c == '-' || c == ' ' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const CSRF_MISMATCH: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const SESSION_ERROR: i32 = 1006;
    pub const INTERNAL_ERROR: i32 = 5000;
}
