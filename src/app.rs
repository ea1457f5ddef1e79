//! Linkerd demo applications that can be installed on a cluster.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Error};

const EMOJIVOTO_INSTALL_FILE: &str = "https://run.linkerd.io/emojivoto.yml";
const BOOKSAPP_INSTALL_FILE: &str = "https://run.linkerd.io/booksapp.yml";

const EMOJIVOTO_LOCAL_FILE: &str = "emojivoto.yml";
const BOOKSAPP_LOCAL_FILE: &str = "booksapp.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoApp {
    Emojivoto,
    BooksApp,
}

impl DemoApp {
    pub fn name(self) -> &'static str {
        match self {
            DemoApp::Emojivoto => "emojivoto",
            DemoApp::BooksApp => "booksapp",
        }
    }

    pub fn remote_url(self) -> &'static str {
        match self {
            DemoApp::Emojivoto => EMOJIVOTO_INSTALL_FILE,
            DemoApp::BooksApp => BOOKSAPP_INSTALL_FILE,
        }
    }

    /// Where the manifest is cached inside `cache_dir`.
    pub fn local_file(self, cache_dir: &Path) -> PathBuf {
        let file = match self {
            DemoApp::Emojivoto => EMOJIVOTO_LOCAL_FILE,
            DemoApp::BooksApp => BOOKSAPP_LOCAL_FILE,
        };
        cache_dir.join(file)
    }
}

impl fmt::Display for DemoApp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DemoApp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emojivoto" => Ok(DemoApp::Emojivoto),
            "booksapp" => Ok(DemoApp::BooksApp),
            other => Err(anyhow!(
                "unknown demo app {:?}, expected one of: emojivoto, booksapp",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::app::DemoApp;
    use std::path::Path;

    #[test]
    fn test_parse() {
        assert_eq!("emojivoto".parse::<DemoApp>().unwrap(), DemoApp::Emojivoto);
        assert_eq!("BooksApp".parse::<DemoApp>().unwrap(), DemoApp::BooksApp);

        let err = "bookinfo".parse::<DemoApp>().unwrap_err();
        assert!(err.to_string().contains("emojivoto, booksapp"));
    }

    #[test]
    fn test_locations() {
        assert_eq!(
            DemoApp::Emojivoto.remote_url(),
            "https://run.linkerd.io/emojivoto.yml"
        );
        assert_eq!(
            DemoApp::BooksApp.local_file(Path::new("/tmp")),
            Path::new("/tmp/booksapp.yml")
        );
    }
}
