use std::collections::HashSet;

/// 无需认证即可访问的路径：精确匹配与 `prefix/**` 前缀匹配
#[derive(Debug, Clone, Default)]
pub struct PublicPaths {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl PublicPaths {
    pub fn parse<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            match pattern.strip_suffix("/**") {
                Some(prefix) => paths.prefixes.push(prefix.trim_end_matches('/').to_string()),
                None => {
                    paths.exact.insert(pattern.to_string());
                }
            }
        }
        paths
    }

    pub fn is_public(&self, path: &str) -> bool {
        if self.exact.contains(path) {
            return true;
        }
        self.prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .map(|rest| rest.is_empty() || rest.starts_with('/'))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> PublicPaths {
        PublicPaths::parse(["/user/login", "/user/register", "/user/image/**"])
    }

    #[test]
    fn exact_paths_match_only_themselves() {
        let paths = defaults();
        assert!(paths.is_public("/user/login"));
        assert!(paths.is_public("/user/register"));
        assert!(!paths.is_public("/user/login/extra"));
        assert!(!paths.is_public("/user/list"));
    }

    #[test]
    fn prefix_patterns_match_whole_subtree() {
        let paths = defaults();
        assert!(paths.is_public("/user/image"));
        assert!(paths.is_public("/user/image/anything"));
        assert!(paths.is_public("/user/image/profile/alice"));
        assert!(!paths.is_public("/user/images"));
        assert!(!paths.is_public("/user/delete/7"));
    }

    #[test]
    fn blank_patterns_are_ignored() {
        let paths = PublicPaths::parse(["", "  "]);
        assert!(!paths.is_public(""));
        assert!(!paths.is_public("/"));
    }
}
