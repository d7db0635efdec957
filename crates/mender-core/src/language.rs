use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub const UNKNOWN: &str = "unknown";
pub const SYSTEM: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageSpec {
    pub tag: &'static str,
    pub extensions: &'static [&'static str],
    pub toolchain: &'static [&'static str],
}

pub const LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        tag: "python",
        extensions: &["py"],
        toolchain: &["python3", "pip3"],
    },
    LanguageSpec {
        tag: "javascript",
        extensions: &["js", "ts"],
        toolchain: &["node", "npm"],
    },
    LanguageSpec {
        tag: "java",
        extensions: &["java"],
        toolchain: &["javac", "java"],
    },
    LanguageSpec {
        tag: "cpp",
        extensions: &["cpp", "cxx", "cc"],
        toolchain: &["g++", "clang++"],
    },
    LanguageSpec {
        tag: "c",
        extensions: &["c"],
        toolchain: &["gcc", "clang"],
    },
    LanguageSpec {
        tag: "go",
        extensions: &["go"],
        toolchain: &["go"],
    },
    LanguageSpec {
        tag: "rust",
        extensions: &["rs"],
        toolchain: &["rustc", "cargo"],
    },
    LanguageSpec {
        tag: "php",
        extensions: &["php"],
        toolchain: &["php"],
    },
    LanguageSpec {
        tag: "ruby",
        extensions: &["rb"],
        toolchain: &["ruby"],
    },
    LanguageSpec {
        tag: "bash",
        extensions: &["sh", "bash"],
        toolchain: &["bash"],
    },
];

const SHEBANG_INTERPRETERS: &[(&str, &str)] = &[
    ("python", "python"),
    ("node", "javascript"),
    ("bash", "bash"),
    ("ruby", "ruby"),
];

pub fn spec_for(tag: &str) -> Option<&'static LanguageSpec> {
    LANGUAGES.iter().find(|lang| lang.tag == tag)
}

pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|lang| lang.extensions.contains(&ext.as_str()))
        .map(|lang| lang.tag)
}

pub fn language_for_shebang(first_line: &str) -> Option<&'static str> {
    let line = first_line.trim();
    if !line.starts_with("#!") {
        return None;
    }
    SHEBANG_INTERPRETERS
        .iter()
        .find(|(needle, _)| line.contains(needle))
        .map(|(_, tag)| *tag)
}

/// Extension first, then the shebang line; `"unknown"` when neither resolves.
pub fn detect_language(path: &Path) -> &'static str {
    if let Some(tag) = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(language_for_extension)
    {
        return tag;
    }

    read_first_line(path)
        .as_deref()
        .and_then(language_for_shebang)
        .unwrap_or(UNKNOWN)
}

fn read_first_line(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut buf = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut buf).ok()?;
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Language of the first argument in `command` whose extension is recognized.
pub fn infer_command_language(command: &str) -> &'static str {
    command
        .split_whitespace()
        .filter_map(|token| {
            let token = token.trim_matches(|c| c == '"' || c == '\'');
            Path::new(token).extension().and_then(|ext| ext.to_str())
        })
        .find_map(language_for_extension)
        .unwrap_or(SYSTEM)
}

#[cfg(test)]
mod tests {
    use super::{detect_language, infer_command_language, language_for_shebang, spec_for};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn every_recognized_extension_maps_to_its_language() {
        let cases = [
            ("a.py", "python"),
            ("a.js", "javascript"),
            ("a.ts", "javascript"),
            ("A.java", "java"),
            ("a.cpp", "cpp"),
            ("a.cxx", "cpp"),
            ("a.cc", "cpp"),
            ("a.c", "c"),
            ("a.go", "go"),
            ("a.rs", "rust"),
            ("a.php", "php"),
            ("a.rb", "ruby"),
            ("a.sh", "bash"),
            ("a.bash", "bash"),
            ("UPPER.PY", "python"),
        ];
        for (name, expected) in cases {
            assert_eq!(detect_language(Path::new(name)), expected, "{name}");
        }
    }

    #[test]
    fn falls_back_to_shebang() {
        let dir = tempdir().expect("tempdir should work");
        let cases = [
            ("tool", "#!/usr/bin/env python3\nprint(1)\n", "python"),
            ("serve", "#!/usr/bin/env node\n", "javascript"),
            ("setup.txt", "#!/bin/bash\necho\n", "bash"),
            ("gemfile", "#!/usr/bin/ruby\n", "ruby"),
        ];
        for (name, content, expected) in cases {
            let path = dir.path().join(name);
            fs::write(&path, content).expect("write should work");
            assert_eq!(detect_language(&path), expected, "{name}");
        }
    }

    #[test]
    fn unknown_without_extension_or_shebang() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("notes.txt");
        fs::write(&path, "just words\n").expect("write should work");
        assert_eq!(detect_language(&path), "unknown");
        assert_eq!(detect_language(&dir.path().join("missing.xyz")), "unknown");
    }

    #[test]
    fn shebang_requires_marker() {
        assert_eq!(language_for_shebang("python rocks"), None);
        assert_eq!(language_for_shebang("#!/bin/zsh"), None);
    }

    #[test]
    fn command_language_from_arguments() {
        assert_eq!(infer_command_language("python3 ./app.py --flag"), "python");
        assert_eq!(infer_command_language("gcc -o out main.c"), "c");
        assert_eq!(infer_command_language("node 'server.js'"), "javascript");
        assert_eq!(infer_command_language("ls -la /tmp"), "system");
    }

    #[test]
    fn toolchains_are_listed() {
        assert_eq!(spec_for("rust").map(|s| s.toolchain), Some(&["rustc", "cargo"][..]));
        assert!(spec_for("cobol").is_none());
    }
}
