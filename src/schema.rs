table! {
    appointments (id) {
        id -> Uuid,
        coach_id -> Uuid,
        student_id -> Uuid,
        date -> Date,
        time -> Nullable<Time>,
        attendance_mode -> Text,
        status -> Text,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}
