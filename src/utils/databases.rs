// Databases backed up when DB_NAMES is not set
pub const DEFAULT_DATABASES: &[&str] = &[
    "fayo", "user_service", "hospital_service", "doctor_service",
    "specialty_service", "appointment_service", "payment_service",
];
