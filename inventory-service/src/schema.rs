diesel::table! {
    inventory_ledger (product_id, shop_id) {
        product_id -> Uuid,
        shop_id -> Uuid,
        quantity -> Int4,
        shop_specific_cost -> Nullable<Numeric>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    products (id) {
        id -> Uuid,
        name -> Varchar,
    }
}

diesel::table! {
    shops (id) {
        id -> Uuid,
        name -> Varchar,
    }
}

diesel::table! {
    transfer_items (transfer_id, line_no) {
        transfer_id -> Uuid,
        line_no -> Int4,
        product_id -> Uuid,
        quantity -> Int4,
    }
}

diesel::table! {
    transfers (id) {
        id -> Uuid,
        source_shop_id -> Uuid,
        destination_shop_id -> Uuid,
        status -> Varchar,
        note -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(inventory_ledger -> products (product_id));
diesel::joinable!(inventory_ledger -> shops (shop_id));
diesel::joinable!(transfer_items -> products (product_id));
diesel::joinable!(transfer_items -> transfers (transfer_id));

diesel::allow_tables_to_appear_in_same_query!(
    inventory_ledger,
    products,
    shops,
    transfer_items,
    transfers,
);
