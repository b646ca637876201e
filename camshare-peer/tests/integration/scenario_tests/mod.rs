mod test_camera_starts_late;
