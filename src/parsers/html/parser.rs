//! srcset 解析
//!
//! 将 `srcset` 属性拆分为候选项（地址 + 描述符），并在改写后重新组合。
//! 地址中可以包含逗号（例如图片处理服务的参数），因此按照
//! “地址是一段非空白字符，描述符延续到下一个括号外的逗号”的规则切分。
//!
//! ```rust
//! use imgcdn::parsers::html::parser::parse_srcset;
//!
//! let items = parse_srcset("small.jpg 480w, large.jpg 800w");
//! assert_eq!(items.len(), 2);
//! assert_eq!(items[0].path, "small.jpg");
//! assert_eq!(items[1].descriptor, "800w");
//! ```

use super::utils::WHITESPACES;

/// srcset 中的单个候选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcSetItem<'a> {
    /// 图片地址
    pub path: &'a str,
    /// 宽度（`480w`）或像素密度（`2x`）描述符，可能为空
    pub descriptor: &'a str,
}

/// 解析 srcset 属性
pub fn parse_srcset(srcset: &str) -> Vec<SrcSetItem<'_>> {
    let mut items = Vec::new();
    let bytes = srcset.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        // 跳过分隔符
        while i < bytes.len() && (is_space(bytes[i]) || bytes[i] == b',') {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let start = i;
        while i < bytes.len() && !is_space(bytes[i]) {
            i += 1;
        }
        let url = &srcset[start..i];

        // 以逗号结尾的地址没有描述符
        if url.ends_with(',') {
            let path = url.trim_end_matches(',');
            if !path.is_empty() {
                items.push(SrcSetItem {
                    path,
                    descriptor: "",
                });
            }
            continue;
        }

        let descriptor_start = i;
        let mut depth = 0usize;
        while i < bytes.len() {
            match bytes[i] {
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => break,
                _ => {}
            }
            i += 1;
        }

        items.push(SrcSetItem {
            path: url,
            descriptor: srcset[descriptor_start..i].trim_matches(WHITESPACES),
        });
    }

    items
}

/// 将候选项重新组合为 srcset 属性值
pub fn compose_srcset<S: AsRef<str>>(items: &[(S, S)]) -> String {
    items
        .iter()
        .map(|(path, descriptor)| {
            let (path, descriptor) = (path.as_ref(), descriptor.as_ref());
            if descriptor.is_empty() {
                path.to_string()
            } else {
                format!("{} {}", path, descriptor)
            }
        })
        .collect::<Vec<String>>()
        .join(", ")
}

/// 逐个候选项改写 srcset
///
/// `rewrite` 返回 `None` 表示该候选项保持不变。没有任何候选项变化时返回 `None`。
pub fn rewrite_srcset<F>(srcset: &str, mut rewrite: F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut changed = false;
    let items: Vec<(String, String)> = parse_srcset(srcset)
        .into_iter()
        .map(|item| {
            let path = match rewrite(item.path) {
                Some(rewritten) if rewritten != item.path => {
                    changed = true;
                    rewritten
                }
                _ => item.path.to_string(),
            };
            (path, item.descriptor.to_string())
        })
        .collect();

    if changed {
        Some(compose_srcset(&items))
    } else {
        None
    }
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\x0c' | b'\r')
}
