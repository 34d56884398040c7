use serde::Serialize;

use crate::output::error::OutputError;

pub fn to_json<T>(data: &T, pretty: bool) -> Result<Vec<u8>, OutputError>
where
    T: Serialize + ?Sized,
{
    let encoded = if pretty {
        serde_json::to_vec_pretty(data)?
    } else {
        serde_json::to_vec(data)?
    };
    Ok(encoded)
}
