//! Path resolution over the metadata cache.

use common::{MetadataQuery, RemoteObject};

/// Walk `path` from `root_id`, one component at a time.
///
/// Empty components and `.` are ignored, so `/`, `""` and `a//b/` all work.
/// `Ok(None)` means some component does not exist (or is blacklisted).
pub async fn resolve_path<Q>(
    query: &Q,
    root_id: &str,
    path: &str,
) -> Result<Option<RemoteObject>, Q::Error>
where
    Q: MetadataQuery + ?Sized,
{
    let Some(mut current) = query.get(root_id).await? else {
        return Ok(None);
    };

    for component in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
        if !current.is_dir {
            return Ok(None);
        }
        match query.find_child(&current.id, component).await? {
            Some(child) => current = child,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}
