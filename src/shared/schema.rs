diesel::table! {
    booking_slots (id) {
        id -> Uuid,
        slot_date -> Date,
        start_time -> Text,
        capacity -> Int4,
        booked -> Nullable<Int4>,
        enabled -> Bool,
        agent_id -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    appointments (id) {
        id -> Uuid,
        slot_id -> Uuid,
        agent_id -> Uuid,
        client_name -> Text,
        client_email -> Text,
        client_phone -> Nullable<Text>,
        client_id -> Nullable<Uuid>,
        property_id -> Nullable<Uuid>,
        operation_type -> Text,
        budget_range -> Nullable<Text>,
        operation_details -> Jsonb,
        status -> Text,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    clients (id) {
        id -> Uuid,
        email -> Text,
        name -> Text,
        phone -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    properties (id) {
        id -> Uuid,
        external_ref -> Text,
        title -> Text,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(appointments -> booking_slots (slot_id));

diesel::allow_tables_to_appear_in_same_query!(booking_slots, appointments, clients, properties,);
