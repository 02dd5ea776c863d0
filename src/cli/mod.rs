pub mod args;

use std::path::{Path, PathBuf};

use crate::error::DocError;

/// Resolve `[SRC] DEST` together with `--from`/`--to`.
///
/// With neither option, one positional argument is DEST and SRC is the
/// current directory. With only one option set, the positional argument
/// fills the other side, defaulting to the current directory.
pub fn find_source_dest(
    from: Option<&Path>,
    to: Option<&Path>,
    args: &[PathBuf],
) -> Result<(PathBuf, PathBuf), DocError> {
    let here = PathBuf::from(".");
    let first = args.first().cloned();
    let extra = match (from, to) {
        (None, None) => args.len() > 2,
        (Some(_), Some(_)) => !args.is_empty(),
        _ => args.len() > 1,
    };
    if extra {
        return Err(DocError::Usage(format!(
            "too many paths: {}",
            args.iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" ")
        )));
    }

    match (from, to) {
        (Some(src), Some(dst)) => Ok((src.to_path_buf(), dst.to_path_buf())),
        (Some(src), None) => Ok((src.to_path_buf(), first.unwrap_or(here))),
        (None, Some(dst)) => Ok((first.unwrap_or(here), dst.to_path_buf())),
        (None, None) => match args {
            [src, dst] => Ok((src.clone(), dst.clone())),
            [dst] => Ok((here, dst.clone())),
            _ => Err(DocError::Usage(
                "you must specify at least the destination directory".to_string(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn positional_forms() {
        assert_eq!(
            find_source_dest(None, None, &paths(&["a", "b"])).unwrap(),
            (PathBuf::from("a"), PathBuf::from("b"))
        );
        assert_eq!(
            find_source_dest(None, None, &paths(&["b"])).unwrap(),
            (PathBuf::from("."), PathBuf::from("b"))
        );
        assert!(find_source_dest(None, None, &[]).is_err());
        assert!(find_source_dest(None, None, &paths(&["a", "b", "c"])).is_err());
    }

    #[test]
    fn option_forms() {
        let a = Path::new("a");
        let b = Path::new("b");
        assert_eq!(
            find_source_dest(Some(a), None, &[]).unwrap(),
            (PathBuf::from("a"), PathBuf::from("."))
        );
        assert_eq!(
            find_source_dest(None, Some(b), &paths(&["x"])).unwrap(),
            (PathBuf::from("x"), PathBuf::from("b"))
        );
        assert_eq!(
            find_source_dest(Some(a), Some(b), &[]).unwrap(),
            (PathBuf::from("a"), PathBuf::from("b"))
        );
        assert!(find_source_dest(Some(a), Some(b), &paths(&["x"])).is_err());
    }
}
