//! OpenAPI/Utoipa configuration.

use crate::admin::ADMIN_TAG;
use crate::api::health::MISC_TAG;
use crate::authz::AUTHZ_TAG;
use crate::certs::CERTS_TAG;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cell Authorization API",
        version = "1.0.0",
        description = "Per-cell token issuance: password-based implicit grant, cell signing keys \
                       and provisioning endpoints."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = AUTHZ_TAG, description = "Authorization endpoint of a cell"),
        (name = CERTS_TAG, description = "Public signing keys of a cell"),
        (name = ADMIN_TAG, description = "Provisioning, restricted to allowed networks")
    )
)]
pub struct ApiDoc;
