use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "name": "Juan Dela Cruz",
        "email": "juan@school.edu",
        "qr_code": "STU-2024-0001",
        "contact": "+639171234567",
        "created_at": "2026-01-01T00:00:00Z"
    })
)]
pub struct Student {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "Juan Dela Cruz")]
    pub name: String,

    #[schema(example = "juan@school.edu")]
    pub email: String,

    /// Opaque payload printed on the student's QR card. Unique.
    #[schema(example = "STU-2024-0001")]
    pub qr_code: String,

    #[schema(example = "+639171234567")]
    pub contact: String,

    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}
