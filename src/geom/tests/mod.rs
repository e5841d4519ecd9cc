mod test_bake_basic;
mod test_mesh_basic;
mod test_profile_basic;
