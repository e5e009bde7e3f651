use crate::errors::ErrorKind;
use crate::prelude::*;
use crate::puppetdb::PuppetDb;

/// Environment name meaning "every environment".
pub const ALL_ENVIRONMENTS: &str = "*";

pub fn is_all(env: &str) -> bool {
    env == ALL_ENVIRONMENTS
}

/// Checks `requested` against the environments PuppetDB knows about.
pub fn resolve<'a>(requested: &'a str, known: &[String]) -> Result<&'a str> {
    if is_all(requested) || known.iter().any(|env| env == requested) {
        Ok(requested)
    } else {
        Err(ErrorKind::UnknownEnvironment(requested.to_string()).into())
    }
}

/// Fetches the known environments and validates `requested` against them.
/// Returns the environment list so views can render the selector.
pub async fn fetch_and_resolve(db: &dyn PuppetDb, requested: &str) -> Result<Vec<String>> {
    let known = db.environments().await?;
    resolve(requested, &known)?;
    Ok(known)
}
