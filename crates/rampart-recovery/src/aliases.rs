//! Import names that differ from the package that provides them.

/// Python import name to PyPI package.
const PYTHON_ALIASES: &[(&str, &str)] = &[
    ("cv2", "opencv-python"),
    ("yaml", "PyYAML"),
    ("PIL", "Pillow"),
    ("sklearn", "scikit-learn"),
    ("skimage", "scikit-image"),
    ("bs4", "beautifulsoup4"),
    ("dateutil", "python-dateutil"),
    ("dotenv", "python-dotenv"),
    ("jwt", "PyJWT"),
    ("Crypto", "pycryptodome"),
    ("OpenSSL", "pyOpenSSL"),
    ("serial", "pyserial"),
    ("usb", "pyusb"),
    ("magic", "python-magic"),
    ("docx", "python-docx"),
    ("pptx", "python-pptx"),
    ("attr", "attrs"),
    ("zmq", "pyzmq"),
    ("MySQLdb", "mysqlclient"),
    ("psycopg2", "psycopg2-binary"),
    ("telegram", "python-telegram-bot"),
    ("Levenshtein", "python-Levenshtein"),
    ("fitz", "PyMuPDF"),
    ("gi", "PyGObject"),
    ("win32api", "pywin32"),
    ("google.protobuf", "protobuf"),
];

/// Python standard-library modules; never installed from PyPI.
const PYTHON_STDLIB: &[&str] = &[
    "abc", "argparse", "asyncio", "base64", "collections", "contextlib", "copy", "csv",
    "dataclasses", "datetime", "decimal", "enum", "functools", "glob", "hashlib", "heapq", "io",
    "itertools", "json", "logging", "math", "os", "pathlib", "pickle", "platform", "pprint",
    "queue", "random", "re", "shutil", "signal", "socket", "sqlite3", "statistics", "string",
    "struct", "subprocess", "sys", "tempfile", "textwrap", "threading", "time", "tomllib",
    "typing", "unittest", "urllib", "uuid", "warnings", "zipfile",
];

/// PyPI package providing the Python module `module`.
///
/// Dotted names are looked up whole first, then by their top-level
/// package.
#[must_use]
pub fn python_package(module: &str) -> String {
    let lookup = |name: &str| {
        PYTHON_ALIASES
            .iter()
            .find(|(import, _)| *import == name)
            .map(|(_, package)| (*package).to_string())
    };
    let top = module.split('.').next().unwrap_or(module);
    lookup(module)
        .or_else(|| lookup(top))
        .unwrap_or_else(|| top.to_string())
}

/// Whether `module` belongs to the Python standard library.
#[must_use]
pub fn is_python_stdlib(module: &str) -> bool {
    let top = module.split('.').next().unwrap_or(module);
    PYTHON_STDLIB.contains(&top)
}

/// npm package for a `require`/`import` specifier.
///
/// Subpaths are dropped: `lodash/fp` is `lodash`, `@scope/pkg/sub` is
/// `@scope/pkg`. Node built-ins (`node:` prefix) have no package.
#[must_use]
pub fn npm_package(specifier: &str) -> Option<String> {
    if specifier.starts_with("node:") || specifier.starts_with('.') || specifier.starts_with('/')
    {
        return None;
    }
    let mut parts = specifier.split('/');
    let first = parts.next()?;
    if first.starts_with('@') {
        let name = parts.next()?;
        Some(format!("{first}/{name}"))
    } else {
        Some(first.to_string())
    }
}
